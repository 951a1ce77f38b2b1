//! Key-switching matrices.
//!
//! A matrix W transforms a ciphertext part under the source handle
//! s^a(X^t) into a pair of parts under {1, s}. Row i is a noisy encryption
//! of P_sp·z^i·s^a(X^t) under s, where z is the digit base and P_sp the
//! product of the special primes; applying the matrix accumulates
//! Σ (a_i·d_i, b_i·d_i) over the digit decomposition d of the part, and the
//! closing mod-switch divides the fresh noise by P_sp.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::ciphertext::SkHandle;
use crate::context::Context;
use crate::error::Result;
use crate::math::GaussianSampler;
use crate::ring::RingElem;

/// Digit base for the decomposition during key switching.
pub const KS_DIGIT_BASE: u64 = 1 << 16;

/// A key-switching matrix from one secret-key handle to the base handle of
/// a target key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeySwitchMatrix {
    from: SkHandle,
    to_key: usize,
    base: u64,
    /// rows[i] = (a_i, b_i) over the full prime set, with
    /// b_i + a_i·s = P_sp·z^i·s_from + p^{r_ks}·e_i.
    rows: Vec<(RingElem, RingElem)>,
    /// Matrix-specific noise bound B_KS (already scaled by 1/P_sp).
    noise_bound: f64,
}

impl KeySwitchMatrix {
    /// Generates the matrix rows for switching `from` to the base handle of
    /// key `to_key`, at plaintext space p^{ks_exponent}.
    ///
    /// `s_to` and `s_from` are the target key polynomial and the source
    /// handle's key polynomial s^a(X^t), both as signed coefficient vectors.
    pub fn generate(
        from: SkHandle,
        to_key: usize,
        s_to: &[i64],
        s_from: &[i64],
        ks_exponent: usize,
        ctx: &Context,
        sampler: &mut GaussianSampler,
    ) -> Result<Self> {
        let chain = ctx.chain();
        let full = chain.all_primes();
        let phi = ctx.phi();
        let ks_space = crate::math::pow_u64(ctx.p(), ks_exponent);
        let p_sp = chain.product(&chain.special_primes());

        let ctxt_bits = chain.log2_product(&chain.ctxt_primes());
        let n_digits = (ctxt_bits / (KS_DIGIT_BASE as f64).log2()).ceil() as usize + 1;

        let s_to_elem = RingElem::from_signed(s_to, full.clone(), chain);
        let s_from_elem = RingElem::from_signed(s_from, full.clone(), chain);

        let mut rows = Vec::with_capacity(n_digits);
        let mut z_power = BigInt::from(1u64);
        for _ in 0..n_digits {
            let a_i = RingElem::random(full.clone(), phi, chain, sampler.rng());
            let e_i = RingElem::from_signed(&sampler.sample_vec(phi), full.clone(), chain);

            // b_i = -a_i s_to + p^{r_ks} e_i + P_sp z^i s_from
            let mut b_i = a_i.mul(&s_to_elem, chain, ctx.cyclo());
            b_i.negate(chain);
            let mut noise = e_i;
            noise.scalar_mul_assign(ks_space as i64, chain);
            b_i.add_assign(&noise, chain);
            let mut payload = s_from_elem.clone();
            payload.scalar_mul_big(&(&p_sp * &z_power), chain);
            b_i.add_assign(&payload, chain);

            rows.push((a_i, b_i));
            z_power *= KS_DIGIT_BASE;
        }

        // B_KS: fresh noise per digit, scaled down by the special primes
        let p_sp_log2 = chain.log2_product(&chain.special_primes());
        let noise_bound = ks_space as f64
            * (KS_DIGIT_BASE as f64 / 2.0)
            * sampler.sigma()
            * phi as f64
            / p_sp_log2.exp2();

        Ok(Self {
            from,
            to_key,
            base: KS_DIGIT_BASE,
            rows,
            noise_bound,
        })
    }

    pub fn from_handle(&self) -> SkHandle {
        self.from
    }

    pub fn to_key(&self) -> usize {
        self.to_key
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn n_digits(&self) -> usize {
        self.rows.len()
    }

    /// The per-application noise bound B_KS.
    pub fn noise_bound(&self) -> f64 {
        self.noise_bound
    }

    /// Accumulates the switched part into `(acc0, acc1)`, both living on
    /// `work_set` (current primes plus the special primes).
    ///
    /// The part is digit-decomposed over its own prime set; each digit is
    /// small, so multiplying the matrix rows by the digits adds only
    /// √d·B_KS noise after the closing mod-switch.
    pub fn apply(
        &self,
        part_elem: &RingElem,
        acc0: &mut RingElem,
        acc1: &mut RingElem,
        ctx: &Context,
    ) -> Result<()> {
        let chain = ctx.chain();
        let work_set = acc0.prime_set().clone();
        let digits = part_elem.decompose_digits(self.base, self.rows.len(), chain);
        for (digit, (a_i, b_i)) in digits.iter().zip(&self.rows) {
            if digit.iter().all(|&d| d == 0) {
                continue;
            }
            let d = RingElem::from_signed(digit, work_set.clone(), chain);
            let a_w = a_i.restrict_to_set(&work_set);
            let b_w = b_i.restrict_to_set(&work_set);
            acc0.add_assign(&b_w.mul(&d, chain, ctx.cyclo()), chain);
            acc1.add_assign(&a_w.mul(&d, chain, ctx.cyclo()), chain);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::BgvParams;

    #[test]
    fn test_generate_shape() {
        let ctx = Context::new(BgvParams::split_m16_p17(2, 90)).unwrap();
        let mut sampler = GaussianSampler::with_seed(3.2, 42);
        let s: Vec<i64> = sampler.sample_ternary(ctx.phi());

        let w = KeySwitchMatrix::generate(
            SkHandle::new(2, 1, 0),
            0,
            &s,
            &s, // placeholder source poly
            2,
            &ctx,
            &mut sampler,
        )
        .unwrap();

        assert_eq!(w.to_key(), 0);
        assert_eq!(w.base(), KS_DIGIT_BASE);
        // 90 bits of ctxt primes at 16 bits per digit, plus slack
        assert!(w.n_digits() >= 6);
        assert!(w.noise_bound() > 0.0);
    }
}
