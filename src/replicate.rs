//! Slot replication: spread the value of one slot across all slots.
//!
//! The slot is first isolated with a unit-selector mask; the masked
//! ciphertext is then summed over the Galois orbit. The orbit sum runs in
//! doubling steps along each cyclic factor of the Galois group, so a group
//! of order n costs O(log n) automorphisms per factor instead of n − 1.

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::error::{arg_err, Result};
use crate::keys::PublicKey;
use crate::math::Zq;
use crate::options::{EvalStats, Options};

/// Generators of (Z/mZ)^* with their orders, for the group shapes this
/// crate uses: powers of two (⟨−1⟩ × ⟨3⟩) and moduli with cyclic groups.
fn group_generators(m: usize) -> Result<Vec<(usize, usize)>> {
    if m >= 8 && m.is_power_of_two() {
        return Ok(vec![(m - 1, 2), (3, m / 4)]);
    }
    if m == 4 {
        return Ok(vec![(3, 2)]);
    }
    // cyclic case: find a primitive root by exhaustive order check
    let order = crate::ring::euler_phi(m);
    for g in 2..m {
        if crate::math::gcd(g as u64, m as u64) != 1 {
            continue;
        }
        let mut v = g % m;
        let mut k = 1;
        while v != 1 {
            v = v * g % m;
            k += 1;
        }
        if k == order {
            return Ok(vec![(g, order)]);
        }
    }
    Err(arg_err!("(Z/{}Z)^* is not cyclic; replication unsupported", m))
}

/// Sums σ_{g^j}(c) for j = 0..order−1 by doubling: partial sums over
/// 2^k-element prefixes are combined greedily to reach the exact order.
fn orbit_sum(
    c: &mut Ciphertext,
    generator: usize,
    order: usize,
    pk: &PublicKey,
    ctx: &Context,
    opts: &Options,
    stats: &mut EvalStats,
) -> Result<()> {
    let m = ctx.m() as u64;
    if order <= 1 {
        return Ok(());
    }
    if order > opts.replicate_recursion_bound {
        return Err(arg_err!(
            "orbit of size {} exceeds the replication recursion bound {}",
            order,
            opts.replicate_recursion_bound
        ));
    }

    // partial[k] = sum over the first 2^k powers; g_pow[k] = g^{2^k}
    let mut partial = vec![c.clone()];
    let mut g_pow = vec![generator % m as usize];
    while (1usize << partial.len()) <= order {
        let k = partial.len() - 1;
        let mut shifted = partial[k].clone();
        shifted.smart_automorph(g_pow[k], pk, ctx, stats)?;
        let mut next = partial[k].clone();
        next.add_ctxt(&shifted, false, ctx)?;
        partial.push(next);
        g_pow.push(Zq::pow(g_pow[k] as u64, 2, m) as usize);
    }

    let top = partial.len() - 1;
    let mut acc = partial[top].clone();
    let mut covered = 1usize << top;
    for k in (0..top).rev() {
        if covered + (1 << k) <= order {
            // shift the 2^k-element prefix past the covered block
            let offset = Zq::pow(generator as u64, covered as u64, m) as usize;
            let mut shifted = partial[k].clone();
            shifted.smart_automorph(offset, pk, ctx, stats)?;
            acc.add_ctxt(&shifted, false, ctx)?;
            covered += 1 << k;
        }
    }
    debug_assert_eq!(covered, order);
    *c = acc;
    Ok(())
}

/// Replaces every slot of `c` with the value of slot `pos`.
pub fn replicate(
    c: &mut Ciphertext,
    pos: usize,
    pk: &PublicKey,
    ctx: &Context,
    opts: &Options,
    stats: &mut EvalStats,
) -> Result<()> {
    let encoder = ctx.encoder()?;
    let k = crate::keys::exponent_of(c.ptxt_space(), ctx.p())?;
    let mask = encoder.unit_selector(pos, k)?;
    c.mul_by_constant(&mask, ctx)?;

    for (generator, order) in group_generators(ctx.m())? {
        orbit_sum(c, generator, order, pk, ctx, opts, stats)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SecretKey;
    use crate::math::GaussianSampler;
    use crate::params::BgvParams;

    #[test]
    fn test_group_generators_cover() {
        // m = 16: two factors of orders 2 and 4
        let gens = group_generators(16).unwrap();
        let total: usize = gens.iter().map(|&(_, o)| o).product();
        assert_eq!(total, 8);

        // m = 7: cyclic of order 6
        let gens = group_generators(7).unwrap();
        assert_eq!(gens.len(), 1);
        assert_eq!(gens[0].1, 6);
    }

    #[test]
    fn test_replicate_slot() {
        let ctx = crate::context::Context::new(BgvParams::split_m16_p17(2, 240)).unwrap();
        let mut sampler = GaussianSampler::with_seed(3.2, 31);
        let sk = SecretKey::generate(&ctx, &mut sampler);
        let pk = PublicKey::generate(&sk, &ctx, &mut sampler).unwrap();

        let slots: Vec<u64> = vec![3, 1, 4, 1, 5, 9, 2, 6];
        let mut c = sk.encrypt_slots(&slots, &ctx, &mut sampler).unwrap();

        let opts = Options::default();
        let mut stats = EvalStats::default();
        replicate(&mut c, 4, &pk, &ctx, &opts, &mut stats).unwrap();

        let out = sk.decrypt_slots(&c, &ctx).unwrap();
        assert!(out.iter().all(|&v| v == 5), "expected all 5s, got {:?}", out);
        assert!(stats.relinearizations > 0);
    }

    #[test]
    fn test_replicate_cyclic_group() {
        let ctx = crate::context::Context::new(BgvParams::split_m7_p29(1, 240)).unwrap();
        let mut sampler = GaussianSampler::with_seed(3.2, 33);
        let sk = SecretKey::generate(&ctx, &mut sampler);
        let pk = PublicKey::generate(&sk, &ctx, &mut sampler).unwrap();

        let slots: Vec<u64> = vec![10, 20, 28, 7, 3, 11];
        let mut c = sk.encrypt_slots(&slots, &ctx, &mut sampler).unwrap();

        let opts = Options::default();
        let mut stats = EvalStats::default();
        replicate(&mut c, 2, &pk, &ctx, &opts, &mut stats).unwrap();

        let out = sk.decrypt_slots(&c, &ctx).unwrap();
        assert!(out.iter().all(|&v| v == 28), "expected all 28s, got {:?}", out);
    }

    #[test]
    fn test_replicate_respects_recursion_bound() {
        let ctx = crate::context::Context::new(BgvParams::split_m7_p29(1, 240)).unwrap();
        let mut sampler = GaussianSampler::with_seed(3.2, 35);
        let sk = SecretKey::generate(&ctx, &mut sampler);
        let pk = PublicKey::generate(&sk, &ctx, &mut sampler).unwrap();

        let slots: Vec<u64> = vec![1, 2, 3, 4, 5, 6];
        let mut c = sk.encrypt_slots(&slots, &ctx, &mut sampler).unwrap();

        let opts = Options {
            replicate_recursion_bound: 2,
            ..Options::default()
        };
        let mut stats = EvalStats::default();
        assert!(replicate(&mut c, 0, &pk, &ctx, &opts, &mut stats).is_err());
    }
}
