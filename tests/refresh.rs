//! End-to-end refresh scenarios: noisy ciphertexts round-trip through the
//! thin and thick pipelines, and digit extraction matches the arithmetic
//! reference on both base 2 and odd bases.

use bgv_refresh::extract::{DigitExtractor, LiftingPolyCache};
use bgv_refresh::math::GaussianSampler;
use bgv_refresh::{
    BgvParams, Bootstrapper, Ciphertext, Context, EvalStats, Options, PublicKey, SecretKey,
    ThinBootstrapper,
};
use rand::Rng;
use rand_chacha::ChaCha20Rng;
use rand::SeedableRng;

/// Builds a refresh-enabled split context with keys.
fn refresh_setup(seed: u64) -> (Context, SecretKey, PublicKey, GaussianSampler) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut ctx = Context::new(BgvParams::split_m16_p17(1, 1200)).unwrap();
    ctx.enable_recryption().unwrap();
    let mut sampler = GaussianSampler::with_seed(3.2, seed);
    let sk = SecretKey::generate(&ctx, &mut sampler);
    let pk = PublicKey::generate(&sk, &ctx, &mut sampler).unwrap();
    (ctx, sk, pk, sampler)
}

/// Squares and re-randomizes until the capacity drops below the threshold,
/// tracking the expected slot values in the clear.
fn burn_capacity(
    c: &mut Ciphertext,
    expected: &mut [u64],
    threshold: i64,
    sk_rng: &mut ChaCha20Rng,
    pk: &PublicKey,
    ctx: &Context,
) {
    let p = ctx.ptxt_space();
    let encoder = ctx.encoder().unwrap();
    let mut stats = EvalStats::default();
    while c.bit_capacity(ctx) > threshold {
        c.square(pk, ctx, &mut stats).unwrap();
        let fresh: Vec<u64> = (0..expected.len())
            .map(|_| sk_rng.gen_range(0..p))
            .collect();
        let coeffs = encoder.encode(&fresh, ctx.r()).unwrap();
        c.add_constant(&coeffs, ctx).unwrap();
        for (e, &f) in expected.iter_mut().zip(&fresh) {
            *e = (*e * *e + f) % p;
        }
    }
}

#[test]
fn thin_bootstrap_roundtrip() {
    let (ctx, sk, pk, mut sampler) = refresh_setup(1001);
    let mut rng = ChaCha20Rng::seed_from_u64(5);

    let mut expected: Vec<u64> = (0..8).map(|_| rng.gen_range(0..17)).collect();
    let mut c = sk.encrypt_slots(&expected, &ctx, &mut sampler).unwrap();

    burn_capacity(&mut c, &mut expected, 200, &mut rng, &pk, &ctx);
    let before = sk.decrypt_slots(&c, &ctx).unwrap();
    assert_eq!(before, expected, "pre-refresh state disagrees with tracking");
    let cap_before = c.capacity(&ctx);

    let boot = ThinBootstrapper::new(&pk, &ctx, Options::default());
    let stats = boot.recrypt(&mut c).unwrap();
    assert!(stats.ctxt_mults > 0);
    assert!(stats.relinearizations > 0);

    let after = sk.decrypt_slots(&c, &ctx).unwrap();
    assert_eq!(after, expected, "refresh changed the plaintext");
    assert!(
        c.capacity(&ctx) > cap_before,
        "refresh did not recover capacity: {} vs {}",
        c.capacity(&ctx),
        cap_before
    );
}

#[test]
fn thin_bootstrap_idempotent() {
    let (ctx, sk, pk, mut sampler) = refresh_setup(1002);
    let mut rng = ChaCha20Rng::seed_from_u64(6);

    let mut expected: Vec<u64> = (0..8).map(|_| rng.gen_range(0..17)).collect();
    let mut c = sk.encrypt_slots(&expected, &ctx, &mut sampler).unwrap();
    burn_capacity(&mut c, &mut expected, 200, &mut rng, &pk, &ctx);

    let boot = ThinBootstrapper::new(&pk, &ctx, Options::default());
    boot.recrypt(&mut c).unwrap();
    let cap_once = c.capacity(&ctx);
    boot.recrypt(&mut c).unwrap();

    assert_eq!(sk.decrypt_slots(&c, &ctx).unwrap(), expected);
    // a second refresh of a fresh ciphertext lands at about the same level
    assert!((c.capacity(&ctx) - cap_once).abs() < 64.0);
}

#[test]
fn thick_bootstrap_roundtrip() {
    let (ctx, sk, pk, mut sampler) = refresh_setup(1003);
    let mut rng = ChaCha20Rng::seed_from_u64(7);

    let mut expected: Vec<u64> = (0..8).map(|_| rng.gen_range(0..17)).collect();
    let mut c = sk.encrypt_slots(&expected, &ctx, &mut sampler).unwrap();
    burn_capacity(&mut c, &mut expected, 200, &mut rng, &pk, &ctx);
    let cap_before = c.capacity(&ctx);

    let boot = Bootstrapper::new(&pk, &ctx, Options::default());
    boot.recrypt(&mut c).unwrap();

    assert_eq!(sk.decrypt_slots(&c, &ctx).unwrap(), expected);
    assert!(c.capacity(&ctx) > cap_before);
}

#[test]
fn bootstrap_lazy_matches_eager() {
    let (ctx, sk, pk, mut sampler) = refresh_setup(1004);
    let mut rng = ChaCha20Rng::seed_from_u64(8);

    let mut expected: Vec<u64> = (0..8).map(|_| rng.gen_range(0..17)).collect();
    let mut c = sk.encrypt_slots(&expected, &ctx, &mut sampler).unwrap();
    burn_capacity(&mut c, &mut expected, 250, &mut rng, &pk, &ctx);

    let mut lazy_c = c.clone();
    let eager = ThinBootstrapper::new(&pk, &ctx, Options::default());
    let lazy = ThinBootstrapper::new(&pk, &ctx, Options::lazy());

    let eager_stats = eager.recrypt(&mut c).unwrap();
    let lazy_stats = lazy.recrypt(&mut lazy_c).unwrap();

    assert_eq!(sk.decrypt_slots(&c, &ctx).unwrap(), expected);
    assert_eq!(sk.decrypt_slots(&lazy_c, &ctx).unwrap(), expected);
    // deferring relinearization must not cost more relinearizations
    assert!(lazy_stats.relinearizations <= eager_stats.relinearizations);
}

#[test]
fn refresh_without_data_fails() {
    let ctx = Context::new(BgvParams::split_m16_p17(1, 300)).unwrap();
    let mut sampler = GaussianSampler::with_seed(3.2, 1005);
    let sk = SecretKey::generate(&ctx, &mut sampler);
    let pk = PublicKey::generate(&sk, &ctx, &mut sampler).unwrap();

    let mut c = sk
        .encrypt_slots(&[1, 2, 3, 4, 5, 6, 7, 8], &ctx, &mut sampler)
        .unwrap();
    let boot = ThinBootstrapper::new(&pk, &ctx, Options::default());
    assert!(boot.recrypt(&mut c).is_err());
}

#[test]
fn trivial_ciphertext_refresh_is_reduction() {
    let (ctx, sk, pk, _) = refresh_setup(1006);
    let mut c = Ciphertext::dummy_encrypt(&[20, 0, 0, 0, 0, 0, 0, 0], &ctx);
    let boot = ThinBootstrapper::new(&pk, &ctx, Options::default());
    boot.recrypt(&mut c).unwrap();
    assert_eq!(sk.decrypt(&c, &ctx).unwrap()[0], 3); // 20 mod 17
}

/// Base-2 digit extraction on coefficient-packed values: the slots cannot
/// be used (2 does not split mod 7), but constant polynomials multiply
/// coefficient-wise, so the trapezoid runs on the free coefficient alone.
#[test]
fn digit_extract_base2_matches_shifted_floor() {
    let ctx = Context::new(BgvParams::new(7, 2, 1, 2400)).unwrap();
    let mut sampler = GaussianSampler::with_seed(3.2, 1007);
    let sk = SecretKey::generate(&ctx, &mut sampler);

    let bot_high = 8usize;
    let space = 1u64 << (bot_high + 1); // p^{bot_high + r}
    let pk = PublicKey::generate_at(&sk, &ctx, &mut sampler, bot_high + 1).unwrap();

    let cache = LiftingPolyCache::new(); // base 2 rows use the multivariate cascade
    let extractor = DigitExtractor::new(&cache, &pk, &ctx, Options::default());

    for value in [0u64, 1, 127, 128, 129, 255, 256, 300, 511] {
        let mut coeffs = vec![0i64; ctx.phi()];
        coeffs[0] = value as i64;
        let mut c = sk.encrypt_at(&coeffs, space, &ctx, &mut sampler).unwrap();

        let mut stats = EvalStats::default();
        let digits = extractor
            .extract_thin(&mut c, bot_high, 1, 1, &mut stats)
            .unwrap();
        assert_eq!(digits.len(), bot_high);
        assert_eq!(c.ptxt_space(), 2);

        let shifted = value + (1 << (bot_high - 1));
        let out = sk.decrypt(&c, &ctx).unwrap()[0].rem_euclid(2) as u64;
        let expected = (shifted >> bot_high) % 2;
        assert_eq!(out, expected, "value {}", value);

        // every extracted digit i is bit i of the shifted value
        for (i, digit) in digits.iter().enumerate() {
            let d = sk.decrypt(digit, &ctx).unwrap()[0].rem_euclid(2) as u64;
            assert_eq!(d, (shifted >> i) % 2, "digit {} of value {}", i, value);
        }
    }
}

/// Balanced ternary digit extraction: removing bot_high balanced digits
/// leaves the balanced-rounded high part.
#[test]
fn digit_extract_base3_balanced() {
    let ctx = Context::new(BgvParams::new(4, 3, 1, 1800)).unwrap();
    let mut sampler = GaussianSampler::with_seed(3.2, 1008);
    let sk = SecretKey::generate(&ctx, &mut sampler);

    let bot_high = 5usize;
    let space = 3u64.pow(bot_high as u32 + 1); // 729
    let pk = PublicKey::generate_at(&sk, &ctx, &mut sampler, bot_high + 1).unwrap();

    let mut cache = LiftingPolyCache::new();
    cache.generate(3, 1, bot_high + 1).unwrap();
    let extractor = DigitExtractor::new(&cache, &pk, &ctx, Options::default());

    let balanced_high = |mut v: i64| -> i64 {
        for _ in 0..bot_high {
            let mut d = v.rem_euclid(3);
            if d > 1 {
                d -= 3;
            }
            v = (v - d) / 3;
        }
        v
    };

    for value in [0i64, 1, 2, 121, 122, 360, 500, 728] {
        let mut coeffs = vec![0i64; ctx.phi()];
        coeffs[0] = value;
        let mut c = sk.encrypt_at(&coeffs, space, &ctx, &mut sampler).unwrap();

        let mut stats = EvalStats::default();
        extractor
            .extract_thin(&mut c, bot_high, 1, 1, &mut stats)
            .unwrap();

        let out = sk.decrypt(&c, &ctx).unwrap()[0].rem_euclid(3);
        let expected = balanced_high(value).rem_euclid(3);
        assert_eq!(out, expected, "value {}", value);
    }
}

/// Two-digit extraction over the split p = 17 context, slot-wise.
#[test]
fn digit_extract_two_digits_p17() {
    let ctx = Context::new(BgvParams::split_m16_p17(1, 1200)).unwrap();
    let mut sampler = GaussianSampler::with_seed(3.2, 1009);
    let sk = SecretKey::generate(&ctx, &mut sampler);
    let pk = PublicKey::generate_at(&sk, &ctx, &mut sampler, 3).unwrap();

    let mut cache = LiftingPolyCache::new();
    cache.generate(17, 1, 3).unwrap();
    let extractor = DigitExtractor::new(&cache, &pk, &ctx, Options::default());

    let space = 17u64.pow(3);
    let slots: Vec<u64> = vec![0, 1, 4912, 289, 144, 1000, 2456, 2457];
    let coeffs = ctx.encoder().unwrap().encode(&slots, 3).unwrap();
    let mut c = sk.encrypt_at(&coeffs, space, &ctx, &mut sampler).unwrap();

    let mut stats = EvalStats::default();
    let digits = extractor.extract_thin(&mut c, 2, 1, 1, &mut stats).unwrap();
    assert_eq!(digits.len(), 2);

    let balanced_high = |mut v: i64| -> i64 {
        for _ in 0..2 {
            let mut d = v.rem_euclid(17);
            if d > 8 {
                d -= 17;
            }
            v = (v - d) / 17;
        }
        v
    };

    let out = sk.decrypt_slots(&c, &ctx).unwrap();
    for (i, &v) in slots.iter().enumerate() {
        let expected = balanced_high(v as i64).rem_euclid(17) as u64;
        assert_eq!(out[i], expected, "slot {} (value {})", i, v);
    }
}
