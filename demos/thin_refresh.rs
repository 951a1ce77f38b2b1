//! Thin-refresh walkthrough: encrypt, compute until the noise budget runs
//! low, refresh, and keep computing.
//!
//! Run with `cargo run --example thin_refresh`.

use bgv_refresh::math::GaussianSampler;
use bgv_refresh::{
    BgvParams, Context, EvalStats, Options, PublicKey, SecretKey, ThinBootstrapper,
};
use rand::Rng;

fn main() -> bgv_refresh::Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    // m = 16, p = 17: eight degree-one slots, plaintext space 17
    let mut ctx = Context::new(BgvParams::split_m16_p17(1, 1200))?;
    ctx.enable_recryption()?;
    let rc = ctx.recrypt_data()?;
    println!(
        "refresh parameters: e = {}, e' = {}, digits to extract = {}",
        rc.e(),
        rc.e_prime(),
        rc.digits_to_extract()
    );

    let mut sampler = GaussianSampler::new(3.2);
    let sk = SecretKey::generate(&ctx, &mut sampler);
    let pk = PublicKey::generate(&sk, &ctx, &mut sampler)?;

    let mut rng = rand::thread_rng();
    let mut values: Vec<u64> = (0..8).map(|_| rng.gen_range(0..17)).collect();
    let mut c = sk.encrypt_slots(&values, &ctx, &mut sampler)?;
    println!("fresh capacity: {} bits", c.bit_capacity(&ctx));

    // square-and-add until the budget is nearly spent
    let mut stats = EvalStats::default();
    while c.bit_capacity(&ctx) > 200 {
        c.square(&pk, &ctx, &mut stats)?;
        let fresh: Vec<u64> = (0..8).map(|_| rng.gen_range(0..17)).collect();
        let coeffs = ctx.encoder()?.encode(&fresh, ctx.r())?;
        c.add_constant(&coeffs, &ctx)?;
        for (v, f) in values.iter_mut().zip(&fresh) {
            *v = (*v * *v + f) % 17;
        }
    }
    println!(
        "after {} multiplications: {} bits left",
        stats.ctxt_mults,
        c.bit_capacity(&ctx)
    );

    let boot = ThinBootstrapper::new(&pk, &ctx, Options::default());
    let refresh_stats = boot.recrypt(&mut c)?;
    println!(
        "refreshed: {} bits of capacity ({} ciphertext multiplications, {} relinearizations)",
        c.bit_capacity(&ctx),
        refresh_stats.ctxt_mults,
        refresh_stats.relinearizations
    );

    let decrypted = sk.decrypt_slots(&c, &ctx)?;
    assert_eq!(decrypted, values, "refresh must preserve the plaintext");
    println!("plaintext intact: {:?}", decrypted);
    Ok(())
}
