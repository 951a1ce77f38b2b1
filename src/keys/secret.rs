//! Secret keys: generation, encryption and decryption.
//!
//! Decryption computes the centered residue of Σ parts[i]·s^{a_i}(X^{t_i})
//! modulo the prime-set product, reduces modulo the plaintext space, and
//! divides out the integer factor.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::ciphertext::{Ciphertext, CtxtPart, SkHandle};
use crate::context::Context;
use crate::error::{arg_err, state_err, Result};
use crate::math::{mod_inverse, GaussianSampler, Zq};
use crate::ring::RingElem;

/// A ternary secret key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecretKey {
    context_id: u64,
    s: Vec<i64>,
}

impl SecretKey {
    /// Samples a fresh ternary secret.
    pub fn generate(ctx: &Context, sampler: &mut GaussianSampler) -> Self {
        Self {
            context_id: ctx.id(),
            s: sampler.sample_ternary(ctx.phi()),
        }
    }

    /// The key polynomial as signed coefficients.
    pub fn poly(&self) -> &[i64] {
        &self.s
    }

    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    /// The polynomial s^a(X^t) for a handle, as signed coefficients.
    ///
    /// Computed over the full chain and recovered exactly: the coefficients
    /// stay far below the chain product for the small powers that occur in
    /// practice.
    pub fn handle_poly(&self, handle: &SkHandle, ctx: &Context) -> Vec<i64> {
        let phi = ctx.phi();
        if handle.is_one() {
            let mut one = vec![0i64; phi];
            one[0] = 1;
            return one;
        }
        let chain = ctx.chain();
        let set = chain.ctxt_primes();
        let base = RingElem::from_signed(&self.s, set.clone(), chain);
        let autom = base.automorph(handle.power_of_x(), chain, ctx.cyclo());
        let mut acc = autom.clone();
        for _ in 1..handle.power_of_s() {
            acc = acc.mul(&autom, chain, ctx.cyclo());
        }
        acc.to_centered_bigints(chain)
            .into_iter()
            .map(|c| c.to_i64().expect("key power coefficient fits i64"))
            .collect()
    }

    /// Encrypts a plaintext polynomial at the context's native space p^r.
    pub fn encrypt(
        &self,
        coeffs: &[i64],
        ctx: &Context,
        sampler: &mut GaussianSampler,
    ) -> Result<Ciphertext> {
        self.encrypt_at(coeffs, ctx.ptxt_space(), ctx, sampler)
    }

    /// Encrypts a plaintext polynomial at an explicit plaintext space p^r'.
    pub fn encrypt_at(
        &self,
        coeffs: &[i64],
        ptxt_space: u64,
        ctx: &Context,
        sampler: &mut GaussianSampler,
    ) -> Result<Ciphertext> {
        if self.context_id != ctx.id() {
            return Err(arg_err!("secret key belongs to a different context"));
        }
        if coeffs.len() > ctx.phi() {
            return Err(arg_err!(
                "plaintext degree {} exceeds ring degree {}",
                coeffs.len(),
                ctx.phi()
            ));
        }
        let chain = ctx.chain();
        let set = chain.ctxt_primes();
        let phi = ctx.phi();

        let mut m = vec![0i64; phi];
        for (slot, &c) in m.iter_mut().zip(coeffs) {
            *slot = Zq::to_signed(Zq::from_signed(c, ptxt_space), ptxt_space);
        }

        let a = RingElem::random(set.clone(), phi, chain, sampler.rng());
        let s_elem = RingElem::from_signed(&self.s, set.clone(), chain);

        // b = m + p^r'·e − a·s
        let mut b = RingElem::from_signed(&m, set.clone(), chain);
        let mut e = RingElem::from_signed(&sampler.sample_vec(phi), set.clone(), chain);
        e.scalar_mul_assign(ptxt_space as i64, chain);
        b.add_assign(&e, chain);
        b.sub_assign(&a.mul(&s_elem, chain, ctx.cyclo()), chain);

        let parts = vec![
            CtxtPart::new(b, SkHandle::one()),
            CtxtPart::new(a, SkHandle::base(0)),
        ];
        let noise =
            ptxt_space as f64 * (0.5 + sampler.sigma() * (phi as f64).sqrt() * 6.0);
        Ok(Ciphertext::from_raw_parts(ctx, parts, set, ptxt_space, noise))
    }

    /// Encrypts slot values (requires the totally-split encoder).
    pub fn encrypt_slots(
        &self,
        slots: &[u64],
        ctx: &Context,
        sampler: &mut GaussianSampler,
    ) -> Result<Ciphertext> {
        let coeffs = ctx.encoder()?.encode(slots, ctx.r())?;
        self.encrypt(&coeffs, ctx, sampler)
    }

    /// Decrypts to a centered coefficient vector modulo the ciphertext's
    /// plaintext space.
    pub fn decrypt(&self, c: &Ciphertext, ctx: &Context) -> Result<Vec<i64>> {
        if self.context_id != ctx.id() {
            return Err(arg_err!("secret key belongs to a different context"));
        }
        c.check_context(ctx)?;
        if c.is_empty() {
            return Err(state_err!("cannot decrypt an empty ciphertext"));
        }
        let chain = ctx.chain();
        let set = c.prime_set().clone();
        let space = c.ptxt_space();

        let mut total = RingElem::zero(set.clone(), ctx.phi());
        for part in c.parts() {
            if part.handle.is_one() {
                total.add_assign(&part.elem, chain);
            } else {
                let key_poly = self.handle_poly(&part.handle, ctx);
                let key_elem = RingElem::from_signed(&key_poly, set.clone(), chain);
                total.add_assign(&part.elem.mul(&key_elem, chain, ctx.cyclo()), chain);
            }
        }

        let f_inv = mod_inverse(c.int_factor() % space, space)
            .ok_or_else(|| state_err!("integer factor not invertible"))?;
        let space_big = BigInt::from(space);
        let half = &space_big / 2;
        let out = total
            .to_centered_bigints(chain)
            .into_iter()
            .map(|n| {
                let mut v = n.mod_floor(&space_big);
                // divide by the integer factor, then center
                v = (v * f_inv).mod_floor(&space_big);
                if v > half {
                    v -= &space_big;
                }
                v.to_i64().expect("plaintext coefficient fits i64")
            })
            .collect();
        Ok(out)
    }

    /// Decrypts and decodes slot values (requires the encoder).
    pub fn decrypt_slots(&self, c: &Ciphertext, ctx: &Context) -> Result<Vec<u64>> {
        let coeffs = self.decrypt(c, ctx)?;
        let k = exponent_of(c.ptxt_space(), ctx.p())?;
        ctx.encoder()?.decode(&coeffs, k)
    }

    /// Conservative correctness predicate: the tracked noise bound is below
    /// half the modulus.
    pub fn would_decrypt(&self, c: &Ciphertext, ctx: &Context) -> bool {
        c.capacity(ctx) > 1.0
    }
}

/// The exponent r' with p^{r'} = space.
pub fn exponent_of(space: u64, p: u64) -> Result<usize> {
    let mut v = space;
    let mut e = 0;
    while v > 1 {
        if v % p != 0 {
            return Err(arg_err!("{} is not a power of {}", space, p));
        }
        v /= p;
        e += 1;
    }
    Ok(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::BgvParams;

    fn setup() -> (Context, SecretKey, GaussianSampler) {
        let ctx = Context::new(BgvParams::split_m16_p17(2, 120)).unwrap();
        let mut sampler = GaussianSampler::with_seed(3.2, 1234);
        let sk = SecretKey::generate(&ctx, &mut sampler);
        (ctx, sk, sampler)
    }

    #[test]
    fn test_exponent_of() {
        assert_eq!(exponent_of(289, 17).unwrap(), 2);
        assert_eq!(exponent_of(1, 17).unwrap(), 0);
        assert!(exponent_of(290, 17).is_err());
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let (ctx, sk, mut sampler) = setup();
        let m: Vec<i64> = vec![1, -2, 3, 100, -100, 0, 42, 144];
        let c = sk.encrypt(&m, &ctx, &mut sampler).unwrap();
        assert!(sk.would_decrypt(&c, &ctx));
        let d = sk.decrypt(&c, &ctx).unwrap();
        assert_eq!(d, m);
    }

    #[test]
    fn test_additive_homomorphism() {
        let (ctx, sk, mut sampler) = setup();
        let m1: Vec<i64> = vec![10, 20, 30, 40, 50, 60, 70, 80];
        let m2: Vec<i64> = vec![5, -5, 100, -100, 1, 2, 3, 4];
        let mut c1 = sk.encrypt(&m1, &ctx, &mut sampler).unwrap();
        let c2 = sk.encrypt(&m2, &ctx, &mut sampler).unwrap();
        c1.add_ctxt(&c2, false, &ctx).unwrap();
        let d = sk.decrypt(&c1, &ctx).unwrap();
        let p2 = 289i64;
        for i in 0..8 {
            let expected = (m1[i] + m2[i]).rem_euclid(p2);
            assert_eq!(d[i].rem_euclid(p2), expected, "coefficient {}", i);
        }
    }

    #[test]
    fn test_subtract_homomorphism() {
        let (ctx, sk, mut sampler) = setup();
        let m1: Vec<i64> = vec![10, 0, 0, 0, 0, 0, 0, 0];
        let m2: Vec<i64> = vec![3, 0, 0, 0, 0, 0, 0, 0];
        let mut c1 = sk.encrypt(&m1, &ctx, &mut sampler).unwrap();
        let c2 = sk.encrypt(&m2, &ctx, &mut sampler).unwrap();
        c1.add_ctxt(&c2, true, &ctx).unwrap();
        let d = sk.decrypt(&c1, &ctx).unwrap();
        assert_eq!(d[0], 7);
    }

    #[test]
    fn test_low_level_multiply_decrypts() {
        let (ctx, sk, mut sampler) = setup();
        let m1: Vec<i64> = vec![3, 0, 0, 0, 0, 0, 0, 0];
        let m2: Vec<i64> = vec![5, 0, 0, 0, 0, 0, 0, 0];
        let c1 = sk.encrypt(&m1, &ctx, &mut sampler).unwrap();
        let c2 = sk.encrypt(&m2, &ctx, &mut sampler).unwrap();
        let prod = c1.mult_low_level(&c2, &ctx).unwrap();
        assert_eq!(prod.parts().len(), 3);
        let d = sk.decrypt(&prod, &ctx).unwrap();
        assert_eq!(d[0], 15);
    }

    #[test]
    fn test_mod_switch_preserves_plaintext() {
        let (ctx, sk, mut sampler) = setup();
        let m: Vec<i64> = vec![7, -8, 9, 0, 0, 0, 11, 12];
        let mut c = sk.encrypt(&m, &ctx, &mut sampler).unwrap();
        let target = crate::ring::PrimeSet::range(0, 1);
        c.mod_switch_down_to(&target, &ctx).unwrap();
        assert_eq!(c.prime_set().card(), 2);
        let d = sk.decrypt(&c, &ctx).unwrap();
        assert_eq!(d, m);
    }

    #[test]
    fn test_automorphism_decrypts_to_mapped_plaintext() {
        let (ctx, sk, mut sampler) = setup();
        let m: Vec<i64> = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let mut c = sk.encrypt(&m, &ctx, &mut sampler).unwrap();
        c.automorph(3, &ctx).unwrap();
        let d = sk.decrypt(&c, &ctx).unwrap();

        // expected: plaintext automorphism applied directly
        let q = 289u64;
        let reduced: Vec<u64> = m.iter().map(|&v| Zq::from_signed(v, q)).collect();
        let mapped = ctx.cyclo().automorph_mod_q(&reduced, 3, q);
        let expected: Vec<i64> = mapped.iter().map(|&v| Zq::to_signed(v, q)).collect();
        assert_eq!(d, expected);
    }

    #[test]
    fn test_slot_encrypt_decrypt() {
        let (ctx, sk, mut sampler) = setup();
        let slots: Vec<u64> = vec![0, 1, 17, 288, 100, 200, 250, 5];
        let c = sk.encrypt_slots(&slots, &ctx, &mut sampler).unwrap();
        let d = sk.decrypt_slots(&c, &ctx).unwrap();
        assert_eq!(d, slots);
    }

    #[test]
    fn test_dummy_encrypt_decrypts_without_key_parts() {
        let (ctx, sk, _) = setup();
        let m: Vec<i64> = vec![4, 0, -9, 0, 0, 0, 0, 0];
        let c = Ciphertext::dummy_encrypt(&m, &ctx);
        let d = sk.decrypt(&c, &ctx).unwrap();
        assert_eq!(d, m);
    }
}
