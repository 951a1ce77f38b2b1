//! Benchmarks for lifting-polynomial generation and the digit-extraction
//! trapezoid on a small split context.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bgv_refresh::extract::{digit_retain_poly, DigitExtractor, LiftingPolyCache};
use bgv_refresh::math::GaussianSampler;
use bgv_refresh::{BgvParams, Context, EvalStats, Options, PublicKey, SecretKey};

fn bench_polynomial_generation(c: &mut Criterion) {
    c.bench_function("digit_retain_poly p=17 e=3", |b| {
        b.iter(|| digit_retain_poly(black_box(17), black_box(1), black_box(3)).unwrap())
    });

    c.bench_function("digit_retain_poly p=2 e=16", |b| {
        b.iter(|| digit_retain_poly(black_box(2), black_box(1), black_box(16)).unwrap())
    });
}

fn bench_trapezoid(c: &mut Criterion) {
    let ctx = Context::new(BgvParams::split_m16_p17(1, 700)).unwrap();
    let mut sampler = GaussianSampler::with_seed(3.2, 9090);
    let sk = SecretKey::generate(&ctx, &mut sampler);
    let pk = PublicKey::generate_at(&sk, &ctx, &mut sampler, 2).unwrap();

    let mut cache = LiftingPolyCache::new();
    cache.generate(17, 1, 2).unwrap();

    let slots: Vec<u64> = vec![0, 1, 16, 17, 30, 100, 200, 288];
    let coeffs = ctx.encoder().unwrap().encode(&slots, 2).unwrap();
    let input = sk.encrypt_at(&coeffs, 289, &ctx, &mut sampler).unwrap();

    c.bench_function("extract_thin one digit p=17", |b| {
        b.iter(|| {
            let extractor = DigitExtractor::new(&cache, &pk, &ctx, Options::default());
            let mut work = input.clone();
            let mut stats = EvalStats::default();
            extractor
                .extract_thin(black_box(&mut work), 1, 1, 1, &mut stats)
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_polynomial_generation, bench_trapezoid);
criterion_main!(benches);
