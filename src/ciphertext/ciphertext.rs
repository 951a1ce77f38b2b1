//! The BGV ciphertext and its arithmetic.
//!
//! A ciphertext is an ordered list of parts; part 0 always carries the
//! constant handle, and for i ≥ 1 part i carries s^i(X^t) for a single t
//! shared by all non-constant parts. Decryption computes the centered
//! residue of Σ parts[i]·s^{handle_i} modulo the prime-set product, reduces
//! it modulo the plaintext space, and divides by the integer factor.
//!
//! Two ciphertexts combine only when one handle list is a prefix of the
//! other; everything else is an error, never silent coercion.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{arg_err, state_err, Error, Result};
use crate::math::{mod_inverse, Zq};
use crate::ring::{PrimeSet, RingElem};

use super::handle::SkHandle;
use super::part::CtxtPart;

/// A BGV ciphertext.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ciphertext {
    pub(crate) context_id: u64,
    pub(crate) parts: Vec<CtxtPart>,
    pub(crate) prime_set: PrimeSet,
    pub(crate) ptxt_space: u64,
    pub(crate) noise_bound: f64,
    /// Integer dividing the decrypted value (BGV).
    pub(crate) int_factor: u64,
    /// Rational decryption divider; meaningful for CKKS only, inert at 1.
    pub(crate) rat_factor: f64,
    /// Plaintext magnitude bound; meaningful for CKKS only, inert at 1.
    pub(crate) ptxt_mag: f64,
}

impl Ciphertext {
    /// A zero ciphertext over the full ciphertext-prime set, with the
    /// context's native plaintext space.
    pub fn zero(ctx: &Context) -> Self {
        Self::zero_with_space(ctx, ctx.ptxt_space())
    }

    /// A zero ciphertext with an explicit plaintext space.
    pub fn zero_with_space(ctx: &Context, ptxt_space: u64) -> Self {
        let prime_set = ctx.chain().ctxt_primes();
        let part = CtxtPart::new(
            RingElem::zero(prime_set.clone(), ctx.phi()),
            SkHandle::one(),
        );
        Self {
            context_id: ctx.id(),
            parts: vec![part],
            prime_set,
            ptxt_space,
            noise_bound: 0.0,
            int_factor: 1,
            rat_factor: 1.0,
            ptxt_mag: 1.0,
        }
    }

    /// A zero ciphertext shaped like `other` (same prime set and plaintext
    /// space).
    pub fn zero_like(other: &Ciphertext, ctx: &Context) -> Self {
        let part = CtxtPart::new(
            RingElem::zero(other.prime_set.clone(), ctx.phi()),
            SkHandle::one(),
        );
        Self {
            context_id: other.context_id,
            parts: vec![part],
            prime_set: other.prime_set.clone(),
            ptxt_space: other.ptxt_space,
            noise_bound: 0.0,
            int_factor: 1,
            rat_factor: 1.0,
            ptxt_mag: 1.0,
        }
    }

    /// A noiseless embedding of a plaintext polynomial (a "dummy"
    /// encryption: a single constant part).
    pub fn dummy_encrypt(coeffs: &[i64], ctx: &Context) -> Self {
        let mut c = Self::zero(ctx);
        let reduced: Vec<i64> = coeffs
            .iter()
            .map(|&v| Zq::to_signed(Zq::from_signed(v, c.ptxt_space), c.ptxt_space))
            .collect();
        c.parts[0].elem = RingElem::from_signed(&reduced, c.prime_set.clone(), ctx.chain());
        c.noise_bound = c.ptxt_space as f64 / 2.0 * ctx.phi() as f64;
        c
    }

    pub(crate) fn from_raw_parts(
        ctx: &Context,
        parts: Vec<CtxtPart>,
        prime_set: PrimeSet,
        ptxt_space: u64,
        noise_bound: f64,
    ) -> Self {
        Self {
            context_id: ctx.id(),
            parts,
            prime_set,
            ptxt_space,
            noise_bound,
            int_factor: 1,
            rat_factor: 1.0,
            ptxt_mag: 1.0,
        }
    }

    // ---- accessors -------------------------------------------------------

    pub fn parts(&self) -> &[CtxtPart] {
        &self.parts
    }

    pub fn prime_set(&self) -> &PrimeSet {
        &self.prime_set
    }

    pub fn ptxt_space(&self) -> u64 {
        self.ptxt_space
    }

    pub fn noise_bound(&self) -> f64 {
        self.noise_bound
    }

    /// Total noise bound; for BGV this is just the noise bound (the CKKS
    /// variant would add ptxt_mag·rat_factor).
    pub fn total_noise_bound(&self) -> f64 {
        self.noise_bound
    }

    pub fn int_factor(&self) -> u64 {
        self.int_factor
    }

    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    /// True when the ciphertext has no parts (cleared state).
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Resets to an empty ciphertext.
    pub fn clear(&mut self) {
        self.parts.clear();
        self.noise_bound = 0.0;
        self.int_factor = 1;
        self.rat_factor = 1.0;
        self.ptxt_mag = 1.0;
    }

    /// True when the handle list is at most {1, s_key}.
    pub fn in_canonical_form(&self, key_id: usize) -> bool {
        if self.parts.len() > 2 {
            return false;
        }
        if !self.parts.is_empty() && !self.parts[0].handle.is_one() {
            return false;
        }
        if self.parts.len() > 1 && !self.parts[1].handle.is_base(key_id) {
            return false;
        }
        true
    }

    /// True when the only part is a constant part (a dummy encryption).
    pub fn is_trivial(&self) -> bool {
        self.parts.len() == 1 && self.parts[0].handle.is_one()
    }

    /// `log2(modulus) − log2(noise)`: the budget for further operations.
    pub fn capacity(&self, ctx: &Context) -> f64 {
        let log_q = ctx.log2_of_set(&self.prime_set);
        log_q - self.noise_bound.max(1.0).log2()
    }

    /// Capacity rounded down to a whole number of bits.
    pub fn bit_capacity(&self, ctx: &Context) -> i64 {
        self.capacity(ctx).floor() as i64
    }

    pub(crate) fn check_context(&self, ctx: &Context) -> Result<()> {
        if self.context_id != ctx.id() {
            return Err(arg_err!("ciphertext belongs to a different context"));
        }
        Ok(())
    }

    // ---- addition --------------------------------------------------------

    /// Adds (or subtracts) another ciphertext in place.
    pub fn add_ctxt(&mut self, other: &Ciphertext, negative: bool, ctx: &Context) -> Result<()> {
        self.check_context(ctx)?;
        other.check_context(ctx)?;

        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            *self = other.clone();
            if negative {
                self.negate(ctx);
            }
            return Ok(());
        }

        if self.ptxt_space != other.ptxt_space {
            return Err(Error::PtxtSpaceMismatch {
                left: self.ptxt_space,
                right: other.ptxt_space,
            });
        }

        // Rescale to a common integer factor: multiply each operand's parts
        // by the other's factor modulo the plaintext space.
        let mut owned: Option<Ciphertext> = None;
        if self.int_factor != other.int_factor {
            let p = self.ptxt_space;
            let f_self = self.int_factor;
            let f_other = other.int_factor;
            self.scale_parts_by(Zq::to_signed(f_other, p), ctx);
            self.int_factor = Zq::mul(f_self, f_other, p);

            let mut o = other.clone();
            o.scale_parts_by(Zq::to_signed(f_self, p), ctx);
            o.int_factor = Zq::mul(f_self, f_other, p);
            owned = Some(o);
        }

        // Bring both to the intersection of the prime sets.
        let common = self
            .prime_set
            .intersection(owned.as_ref().unwrap_or(other).prime_set());
        if common.is_empty() {
            return Err(arg_err!("ciphertexts share no primes"));
        }
        if self.prime_set != common {
            self.mod_switch_down_to(&common, ctx)?;
        }
        if *owned.as_ref().unwrap_or(other).prime_set() != common {
            let mut o = owned.take().unwrap_or_else(|| other.clone());
            o.mod_switch_down_to(&common, ctx)?;
            owned = Some(o);
        }
        let other_ref = owned.as_ref().unwrap_or(other);

        // Handle lists must be prefix-compatible.
        let shared = self.parts.len().min(other_ref.parts.len());
        for i in 0..shared {
            if self.parts[i].handle != other_ref.parts[i].handle {
                return Err(Error::IncompatibleHandles(format!(
                    "part {} handles differ",
                    i
                )));
            }
        }

        for part in &other_ref.parts {
            self.add_signed_part(&part.elem, part.handle, negative, ctx)?;
        }
        self.noise_bound += other_ref.noise_bound;
        Ok(())
    }

    /// Negates the ciphertext in place.
    pub fn negate(&mut self, ctx: &Context) {
        for part in &mut self.parts {
            part.elem.negate(ctx.chain());
        }
    }

    fn scale_parts_by(&mut self, scalar: i64, ctx: &Context) {
        for part in &mut self.parts {
            part.elem.scalar_mul_assign(scalar, ctx.chain());
        }
        self.noise_bound *= scalar.unsigned_abs().max(1) as f64;
    }

    pub(crate) fn add_signed_part(
        &mut self,
        elem: &RingElem,
        handle: SkHandle,
        negative: bool,
        ctx: &Context,
    ) -> Result<()> {
        debug_assert_eq!(*elem.prime_set(), self.prime_set);
        match self.parts.iter_mut().find(|p| p.handle == handle) {
            Some(part) => {
                if negative {
                    part.elem.sub_assign(elem, ctx.chain());
                } else {
                    part.elem.add_assign(elem, ctx.chain());
                }
            }
            None => {
                let mut e = elem.clone();
                if negative {
                    e.negate(ctx.chain());
                }
                // keep parts ordered by power of s so handle lists stay
                // prefix-comparable
                let pos = self
                    .parts
                    .iter()
                    .position(|p| p.handle.power_of_s() > handle.power_of_s())
                    .unwrap_or(self.parts.len());
                self.parts.insert(pos, CtxtPart::new(e, handle));
            }
        }
        Ok(())
    }

    // ---- constants -------------------------------------------------------

    /// Adds a plaintext polynomial (signed coefficients).
    pub fn add_constant(&mut self, coeffs: &[i64], ctx: &Context) -> Result<()> {
        self.check_context(ctx)?;
        if self.is_empty() {
            return Err(state_err!("cannot add a constant to an empty ciphertext"));
        }
        // the constant must carry the same integer factor as the ciphertext
        let p = self.ptxt_space;
        let f = self.int_factor;
        let scaled: Vec<i64> = coeffs
            .iter()
            .map(|&v| Zq::to_signed(Zq::mul(Zq::from_signed(v, p), f, p), p))
            .collect();
        let elem = RingElem::from_signed(&scaled, self.prime_set.clone(), ctx.chain());
        self.parts[0].elem.add_assign(&elem, ctx.chain());

        let max = scaled.iter().map(|c| c.unsigned_abs()).max().unwrap_or(0);
        self.noise_bound += max as f64 * ctx.phi() as f64;
        Ok(())
    }

    /// Adds an integer constant to every slot.
    pub fn add_constant_scalar(&mut self, value: i64, ctx: &Context) -> Result<()> {
        let mut coeffs = vec![0i64; ctx.phi()];
        coeffs[0] = value;
        self.add_constant(&coeffs, ctx)
    }

    /// Multiplies by a plaintext polynomial (signed coefficients).
    pub fn mul_by_constant(&mut self, coeffs: &[i64], ctx: &Context) -> Result<()> {
        self.check_context(ctx)?;
        let elem = RingElem::from_signed(coeffs, self.prime_set.clone(), ctx.chain());
        for part in &mut self.parts {
            part.elem = part.elem.mul(&elem, ctx.chain(), ctx.cyclo());
        }
        let max = coeffs.iter().map(|c| c.unsigned_abs()).max().unwrap_or(0);
        self.noise_bound *= (max as f64 * ctx.phi() as f64).max(1.0);
        Ok(())
    }

    /// Multiplies by an integer scalar.
    pub fn mul_by_scalar(&mut self, value: i64, ctx: &Context) -> Result<()> {
        self.check_context(ctx)?;
        if value == 0 {
            let space = self.ptxt_space;
            *self = Ciphertext::zero_with_space(ctx, space);
            return Ok(());
        }
        self.scale_parts_by(value, ctx);
        Ok(())
    }

    /// Multiplies by a constant given per-prime as a big integer (used by
    /// key switching to carry the special-prime factor).
    pub(crate) fn scale_parts_by_big(&mut self, scalar: &BigInt, magnitude: f64, ctx: &Context) {
        for part in &mut self.parts {
            part.elem.scalar_mul_big(scalar, ctx.chain());
        }
        self.noise_bound *= magnitude.max(1.0);
    }

    pub(crate) fn set_int_factor(&mut self, f: u64) {
        self.int_factor = f;
    }

    pub(crate) fn mul_int_factor(&mut self, e: u64) {
        self.int_factor = Zq::mul(self.int_factor, e % self.ptxt_space, self.ptxt_space);
    }

    // ---- multiplication --------------------------------------------------

    /// Tensor-product multiplication without relinearization. The handle
    /// list lengthens to the sum of the degrees.
    pub fn mult_low_level(&self, other: &Ciphertext, ctx: &Context) -> Result<Ciphertext> {
        self.check_context(ctx)?;
        other.check_context(ctx)?;
        if self.ptxt_space != other.ptxt_space {
            return Err(Error::PtxtSpaceMismatch {
                left: self.ptxt_space,
                right: other.ptxt_space,
            });
        }
        if self.is_empty() || other.is_empty() {
            return Err(state_err!("cannot multiply an empty ciphertext"));
        }

        // operate on the intersection of the prime sets
        let common = self.prime_set.intersection(&other.prime_set);
        let mut lhs = self.clone();
        let mut rhs = other.clone();
        if lhs.prime_set != common {
            lhs.mod_switch_down_to(&common, ctx)?;
        }
        if rhs.prime_set != common {
            rhs.mod_switch_down_to(&common, ctx)?;
        }

        let mut out = Ciphertext::zero_like(&lhs, ctx);
        out.parts.clear();
        for pi in &lhs.parts {
            for pj in &rhs.parts {
                let handle = pi.handle.mul(&pj.handle)?;
                let elem = pi.elem.mul(&pj.elem, ctx.chain(), ctx.cyclo());
                out.add_signed_part(&elem, handle, false, ctx)?;
            }
        }
        out.noise_bound = lhs.noise_bound * rhs.noise_bound;
        out.int_factor = Zq::mul(lhs.int_factor, rhs.int_factor, out.ptxt_space);
        Ok(out)
    }

    /// Mod-switches down to the "natural" size after a multiplication:
    /// trailing ciphertext primes are dropped while the scaled-down noise
    /// stays above the mod-switch floor.
    pub fn mod_switch_to_natural(&mut self, ctx: &Context) -> Result<()> {
        let floor = ctx.mod_switch_added_noise(self.ptxt_space);
        loop {
            let set = &self.prime_set;
            if set.card() <= 1 {
                return Ok(());
            }
            let last = set.last().expect("nonempty set");
            if ctx.chain().special_primes().contains(last) {
                return Ok(());
            }
            let q_last = ctx.chain().prime(last) as f64;
            if self.noise_bound / q_last < floor * 2.0 {
                return Ok(());
            }
            let target = set.difference(&PrimeSet::from_indices(vec![last]));
            self.mod_switch_down_to(&target, ctx)?;
        }
    }

    // ---- automorphism ----------------------------------------------------

    /// Applies the ring automorphism F(X) → F(X^k); requires gcd(k, m) = 1.
    /// The parts' handles pick up the power of X; relinearization is the
    /// caller's business (see `PublicKey::smart_automorph`).
    pub fn automorph(&mut self, k: usize, ctx: &Context) -> Result<()> {
        self.check_context(ctx)?;
        let m = ctx.m();
        if crate::math::gcd(k as u64, m as u64) != 1 {
            return Err(arg_err!("automorphism index {} not coprime to m = {}", k, m));
        }
        let k = k % m;
        for part in &mut self.parts {
            part.elem = part.elem.automorph(k, ctx.chain(), ctx.cyclo());
            part.handle = part.handle.automorph(k, m);
        }
        Ok(())
    }

    // ---- plaintext-space management -------------------------------------

    /// Restricts the plaintext space to a divisor of the current one.
    pub fn reduce_ptxt_space(&mut self, new_space: u64, _ctx: &Context) -> Result<()> {
        if new_space < 2 || self.ptxt_space % new_space != 0 {
            return Err(arg_err!(
                "new plaintext space {} does not divide {}",
                new_space,
                self.ptxt_space
            ));
        }
        self.ptxt_space = new_space;
        self.int_factor %= new_space;
        if self.int_factor == 0 {
            self.int_factor = 1;
        }
        Ok(())
    }

    /// Divides the ciphertext by p. The caller guarantees the encrypted
    /// polynomial is divisible by p; the plaintext space drops from p^r to
    /// p^{r−1}.
    pub fn divide_by_p(&mut self, ctx: &Context) -> Result<()> {
        let p = ctx.p();
        if self.ptxt_space % p != 0 || self.ptxt_space == p {
            return Err(state_err!(
                "divide_by_p needs plaintext space p^r with r > 1, have {}",
                self.ptxt_space
            ));
        }
        for part in &mut self.parts {
            part.elem.mul_scalar_inverse(p, ctx.chain());
        }
        self.ptxt_space /= p;
        self.noise_bound /= p as f64;
        self.int_factor %= self.ptxt_space;
        if self.int_factor == 0 {
            self.int_factor = 1;
        }
        Ok(())
    }

    /// Multiplies by p^e, enlarging the plaintext space to p^{r+e}.
    pub fn mul_by_p(&mut self, e: usize, ctx: &Context) -> Result<()> {
        let p2e = crate::math::pow_u64(ctx.p(), e);
        self.ptxt_space = self
            .ptxt_space
            .checked_mul(p2e)
            .ok_or_else(|| arg_err!("plaintext space overflow in mul_by_p"))?;
        self.scale_parts_by(p2e as i64, ctx);
        Ok(())
    }

    // ---- mod switching ---------------------------------------------------

    /// Mod-switches down to `target`, which must be a valid subset of the
    /// current prime set. Noise scales down by the dropped product and the
    /// integer factor picks up its inverse modulo the plaintext space.
    pub fn mod_switch_down_to(&mut self, target: &PrimeSet, ctx: &Context) -> Result<()> {
        self.check_context(ctx)?;
        if !target.is_subset_of(&self.prime_set) {
            return Err(arg_err!("mod-switch target is not a subset"));
        }
        if !ctx.chain().verify_prime_set(target) {
            return Err(arg_err!(
                "mod-switch target splits the special primes"
            ));
        }
        let dropped = self.prime_set.difference(target);
        if dropped.is_empty() {
            return Ok(());
        }

        for part in &mut self.parts {
            part.elem = part
                .elem
                .mod_switch_down(target, self.ptxt_space, ctx.chain());
        }

        let d_big = ctx.chain().product(&dropped);
        let d_f64 = ctx.chain().log2_product(&dropped).exp2();
        let d_mod_p = crate::ring::elem::bigint_mod_u64(&d_big, self.ptxt_space);
        let inv = mod_inverse(d_mod_p, self.ptxt_space)
            .ok_or_else(|| state_err!("dropped primes not invertible mod plaintext space"))?;
        self.int_factor = Zq::mul(self.int_factor, inv, self.ptxt_space);
        self.noise_bound =
            self.noise_bound / d_f64 + ctx.mod_switch_added_noise(self.ptxt_space);
        self.prime_set = target.clone();
        Ok(())
    }

    /// Mod-switches up to a superset of the current prime set. The parts
    /// keep their centered values; the noise picks up the wrap term of the
    /// old modulus.
    pub fn mod_switch_up_to(&mut self, target: &PrimeSet, ctx: &Context) -> Result<()> {
        self.check_context(ctx)?;
        if !self.prime_set.is_subset_of(target) {
            return Err(arg_err!("mod-switch-up target must contain the prime set"));
        }
        if !ctx.chain().verify_prime_set(target) {
            return Err(arg_err!("mod-switch target splits the special primes"));
        }
        for part in &mut self.parts {
            part.elem = part.elem.mod_up(target, ctx.chain());
        }
        // residues now represent n + Q_old·k with |k| bounded by the key norm
        let q_old = ctx.log2_of_set(&self.prime_set).exp2();
        self.noise_bound += q_old * (1.0 + ctx.phi() as f64);
        self.prime_set = target.clone();
        Ok(())
    }

    /// Drops the special primes (if present) from the prime set.
    pub fn drop_special_primes(&mut self, ctx: &Context) -> Result<()> {
        let special = ctx.chain().special_primes();
        if self.prime_set.intersection(&special).is_empty() {
            return Ok(());
        }
        let target = self.prime_set.difference(&special);
        self.mod_switch_down_to(&target, ctx)
    }

    // ---- raw mod switch (bootstrapping entry) ---------------------------

    /// Mod-switch to an external modulus `q` that need not belong to the
    /// chain. The ciphertext itself is untouched; the rescaled parts are
    /// returned as integer polynomials z_i with
    /// z_0 + z_1·s ≈ (q/Q)·(c_0 + c_1·s) and the congruence
    /// z_i·Q ≡ q·c_i (mod ptxt_space) preserved, so the plaintext picks up
    /// exactly the factor Q^{-1} modulo the plaintext space.
    ///
    /// Returns the polynomials, an estimate of the scaled noise, and
    /// Q^{-1} mod ptxt_space (the integer-factor adjustment the caller must
    /// account for).
    pub fn raw_mod_switch(&self, q: u64, ctx: &Context) -> Result<(Vec<Vec<i64>>, f64, u64)> {
        use num_integer::Integer;
        use num_traits::ToPrimitive;

        self.check_context(ctx)?;
        if self.parts.len() != 2 {
            return Err(state_err!(
                "raw mod-switch expects a canonical two-part ciphertext, have {} parts",
                self.parts.len()
            ));
        }

        let space = self.ptxt_space;
        let q_total = ctx.chain().product(&self.prime_set);
        let half_q_total = &q_total / 2;
        let q_mod_space = crate::ring::elem::bigint_mod_u64(&q_total, space);
        let q_inv_space = mod_inverse(q_mod_space, space)
            .ok_or_else(|| state_err!("chain product not invertible mod plaintext space"))?;

        let q_big = BigInt::from(q);
        let mut out = Vec::with_capacity(2);
        for part in &self.parts {
            let ints = part.elem.to_centered_bigints(ctx.chain());
            let zz: Vec<i64> = ints
                .iter()
                .map(|c| {
                    // z = (q·c − δ)/Q with δ ≡ q·c (mod Q), δ ≡ 0 (mod p^r),
                    // δ centered: exact division, small rounding, plaintext
                    // congruence preserved up to the factor Q^{-1}
                    let num = c * &q_big;
                    let mut delta = num.mod_floor(&q_total);
                    if delta > half_q_total {
                        delta -= &q_total;
                    }
                    let d_mod = crate::ring::elem::bigint_mod_u64(&delta, space);
                    let t = Zq::to_signed(Zq::mul(d_mod, q_inv_space, space), space);
                    delta -= BigInt::from(t) * &q_total;
                    let z = (num - delta) / &q_total;
                    z.to_i64().expect("rescaled coefficient fits i64")
                })
                .collect();
            out.push(zz);
        }

        // scaled noise plus the rounding contribution of both parts
        let q_log2 = ctx.log2_of_set(&self.prime_set);
        let scale = q as f64 / q_log2.exp2();
        let rounding = 0.5 * space as f64 * (1.0 + ctx.phi() as f64);
        let noise_est = self.noise_bound * scale + rounding;
        Ok((out, noise_est, q_inv_space))
    }

    // ---- CKKS shims ------------------------------------------------------

    /// Equalizes the rational factors of two ciphertexts before addition.
    /// BGV ciphertexts always carry factor 1, so this only checks.
    pub fn equalize_rational_factors(a: &mut Ciphertext, b: &mut Ciphertext) {
        if a.rat_factor != b.rat_factor {
            let f = a.rat_factor.max(b.rat_factor);
            a.rat_factor = f;
            b.rat_factor = f;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::BgvParams;

    fn ctx() -> Context {
        Context::new(BgvParams::split_m16_p17(2, 120)).unwrap()
    }

    #[test]
    fn test_zero_invariants() {
        let ctx = ctx();
        let c = Ciphertext::zero(&ctx);
        assert_eq!(c.parts().len(), 1);
        assert!(c.parts()[0].handle.is_one());
        assert!(c.in_canonical_form(0));
        assert_eq!(c.int_factor(), 1);
    }

    #[test]
    fn test_add_ptxt_space_mismatch() {
        let ctx = ctx();
        let mut a = Ciphertext::zero(&ctx);
        let b = Ciphertext::zero_with_space(&ctx, 17);
        let err = a.add_ctxt(&b, false, &ctx).unwrap_err();
        assert!(matches!(err, Error::PtxtSpaceMismatch { .. }));
    }

    #[test]
    fn test_dummy_encrypt_roundtrip_via_parts() {
        let ctx = ctx();
        let coeffs = vec![5i64, -3, 0, 200, 0, 0, 1, -288];
        let c = Ciphertext::dummy_encrypt(&coeffs, &ctx);
        let back = c.parts()[0].elem.to_centered_bigints(ctx.chain());
        // values are stored reduced mod 289, centered
        assert_eq!(back[0], 5i64.into());
        assert_eq!(back[3], (-89i64).into()); // 200 - 289
        assert_eq!(back[7], 1i64.into()); // -288 + 289
    }

    #[test]
    fn test_reduce_ptxt_space_divisor_only() {
        let ctx = ctx();
        let mut c = Ciphertext::zero(&ctx); // space 289
        assert!(c.reduce_ptxt_space(17, &ctx).is_ok());
        assert_eq!(c.ptxt_space(), 17);
        assert!(c.reduce_ptxt_space(4, &ctx).is_err());
    }

    #[test]
    fn test_divide_by_p_requires_room() {
        let ctx = ctx();
        let mut c = Ciphertext::zero(&ctx);
        assert!(c.divide_by_p(&ctx).is_ok()); // 289 -> 17
        assert!(c.divide_by_p(&ctx).is_err()); // cannot drop below p
    }

    #[test]
    fn test_mul_by_p_round_trip_space() {
        let ctx = ctx();
        let mut c = Ciphertext::zero(&ctx);
        c.mul_by_p(2, &ctx).unwrap();
        assert_eq!(c.ptxt_space(), 289 * 289);
    }

    #[test]
    fn test_mod_switch_down_rejects_non_subset() {
        let ctx = ctx();
        let mut c = Ciphertext::zero(&ctx);
        let bogus = PrimeSet::from_indices(vec![999]);
        assert!(c.mod_switch_down_to(&bogus, &ctx).is_err());
    }

    #[test]
    fn test_capacity_decreases_with_noise() {
        let ctx = ctx();
        let mut c = Ciphertext::dummy_encrypt(&[1, 0, 0, 0, 0, 0, 0, 0], &ctx);
        let cap0 = c.capacity(&ctx);
        c.mul_by_scalar(1 << 20, &ctx).unwrap();
        assert!(c.capacity(&ctx) < cap0);
    }

    #[test]
    fn test_automorph_updates_handles() {
        let ctx = ctx();
        let mut c = Ciphertext::zero(&ctx);
        // give it a fake base part to watch the handle move
        let elem = RingElem::zero(c.prime_set().clone(), ctx.phi());
        c.add_signed_part(&elem, SkHandle::base(0), false, &ctx).unwrap();
        c.automorph(3, &ctx).unwrap();
        assert_eq!(c.parts()[1].handle.power_of_x(), 3);
        assert!(c.automorph(2, &ctx).is_err()); // gcd(2, 16) != 1
    }

    #[test]
    fn test_raw_mod_switch_shape() {
        let ctx = ctx();
        let mut c = Ciphertext::zero(&ctx);
        let elem = RingElem::zero(c.prime_set().clone(), ctx.phi());
        c.add_signed_part(&elem, SkHandle::base(0), false, &ctx).unwrap();
        let (zz, _noise, q_inv) = c.raw_mod_switch(17u64.pow(3) + 1, &ctx).unwrap();
        assert_eq!(zz.len(), 2);
        assert_eq!(zz[0].len(), ctx.phi());
        // Q^{-1} is a unit modulo the plaintext space
        assert_ne!(q_inv, 0);
    }
}
