//! Refresh parameters and precomputed refresh data.
//!
//! Parameter selection follows the high-probability analysis: e and e' are
//! chosen so that p^e exceeds 2·(fudge·p^{e'} + 2·p^r + 2)·B, where B is
//! the recryption coefficient bound. Among the admissible pairs the search
//! minimizes e − e', the number of digits to extract, with e' as large as
//! possible; e is capped so that p^e + 1 fits comfortably in a word.

use crate::context::Context;
use crate::error::{state_err, Result};
use crate::extract::LiftingPolyCache;
use crate::linear::{coeffs_to_slots, slots_to_coeffs, MatMulTransform};
use crate::math::pow_u64;

/// The native scalar width bound: e is the largest exponent with
/// p^e + 1 < 2^30.
const E_CAP_BITS: u64 = 1 << 30;

/// Corrects for the v-coefficients of make-divisible not being exactly
/// uniform.
pub fn compute_fudge(p2e_prime: u64, p2e: u64) -> f64 {
    let mut eps = 0.0;
    if p2e_prime > 1 {
        if p2e_prime % 2 == 0 {
            eps = 1.0 / (p2e_prime as f64 * p2e_prime as f64);
        } else {
            eps = 1.0 / p2e as f64;
        }
    }
    1.0 + eps
}

/// Computes the pair (e, e') for a context.
pub fn select_parameters(ctx: &Context) -> Result<(usize, usize)> {
    let p = ctx.p();
    let r = ctx.r();
    let p2r = ctx.ptxt_space();
    let coeff_bound = ctx.bound_for_recryption();
    let first_term = (2 * p2r + 2) as f64;

    // largest e with p^e + 1 below the scalar cap
    let mut e_bnd = 0usize;
    let mut p2e_bnd = 1u64;
    while p2e_bnd <= (E_CAP_BITS - 2) / p {
        e_bnd += 1;
        p2e_bnd *= p;
    }

    // smallest e with p^e/2 above the zero-e' bound
    let mut e_prime = 0usize;
    let mut e = r + 1;
    while e <= e_bnd && (pow_u64(p, e) as f64) < first_term * coeff_bound * 2.0 {
        e += 1;
    }
    if e > e_bnd {
        return Err(state_err!(
            "cannot find a suitable refresh exponent for p = {}, r = {}",
            p,
            r
        ));
    }

    // grow e' while the digit count e - e' shrinks
    for e_prime_try in 1..=e_bnd {
        let p2ep_try = pow_u64(p, e_prime_try);
        let mut e_try = (r + 1).max(e_prime_try + 1);
        while e_try <= e_bnd && e_try - e_prime_try < e - e_prime {
            let p2e_try = pow_u64(p, e_try);
            let fudge = compute_fudge(p2ep_try, p2e_try);
            if p2e_try as f64 >= (p2ep_try as f64 * fudge + first_term) * coeff_bound * 2.0 {
                break;
            }
            e_try += 1;
        }
        if e_try <= e_bnd && e_try - e_prime_try < e - e_prime {
            e = e_try;
            e_prime = e_prime_try;
        }
    }

    Ok((e, e_prime))
}

/// Precomputed data for ciphertext refreshment: the exponents, the lifting
/// polynomials, the linear maps, and the unpack/repack constants of the
/// packed path. Read-only after construction.
#[derive(Debug)]
pub struct RecryptData {
    e: usize,
    e_prime: usize,
    r: usize,
    cache: LiftingPolyCache,
    /// CoefficientsToSlots at exponent e − e' + r.
    coeff_to_slot: MatMulTransform,
    /// SlotsToCoefficients at exponent r.
    slot_to_coeff: MatMulTransform,
    /// Slot-isolation constants for the packed unpack phase, one per
    /// Frobenius power.
    unpack_encodings: Vec<Vec<i64>>,
    /// X^i-in-slots constants for the repack phase.
    repack_encodings: Vec<Vec<i64>>,
}

impl RecryptData {
    /// Builds refresh data for a context. The plaintext prime must split
    /// completely (the linear maps require the slot encoder), and the
    /// selected e' must reach r so that the dropped low digits vanish
    /// modulo p^r.
    pub fn build(ctx: &Context) -> Result<Self> {
        let (e, e_prime) = select_parameters(ctx)?;
        let r = ctx.r();
        if e_prime < r {
            return Err(state_err!(
                "refresh parameters give e' = {} < r = {}; the dropped digits would not vanish",
                e_prime,
                r
            ));
        }
        let total = e - e_prime + r;

        let encoder = ctx.encoder()?;
        if total > encoder.max_exponent() {
            return Err(state_err!(
                "encoder covers exponents up to {}, refresh needs {}",
                encoder.max_exponent(),
                total
            ));
        }

        let mut cache = LiftingPolyCache::new();
        cache.generate(ctx.p(), 1, total)?;

        let coeff_to_slot = coeffs_to_slots(total, ctx)?;
        let slot_to_coeff = slots_to_coeffs(r, ctx)?;

        // with degree-one slots there is a single Frobenius power; the
        // isolation constant is the all-ones slot vector and repacking is
        // the identity
        let d = ctx.params().ord_p();
        let ones = encoder.encode(&vec![1u64; encoder.n_slots()], total)?;
        let unpack_encodings = vec![ones.clone(); d];
        let repack_encodings = vec![ones; d];

        Ok(Self {
            e,
            e_prime,
            r,
            cache,
            coeff_to_slot,
            slot_to_coeff,
            unpack_encodings,
            repack_encodings,
        })
    }

    pub fn e(&self) -> usize {
        self.e
    }

    pub fn e_prime(&self) -> usize {
        self.e_prime
    }

    /// The number of digits the refresh extracts.
    pub fn digits_to_extract(&self) -> usize {
        self.e - self.e_prime
    }

    /// The exponent of the intermediate plaintext space, e − e' + r.
    pub fn plaintext_exponent(&self) -> usize {
        self.e - self.e_prime + self.r
    }

    pub fn cache(&self) -> &LiftingPolyCache {
        &self.cache
    }

    pub fn coeff_to_slot(&self) -> &MatMulTransform {
        &self.coeff_to_slot
    }

    pub fn slot_to_coeff(&self) -> &MatMulTransform {
        &self.slot_to_coeff
    }

    pub fn unpack_encodings(&self) -> &[Vec<i64>] {
        &self.unpack_encodings
    }

    pub fn repack_encodings(&self) -> &[Vec<i64>] {
        &self.repack_encodings
    }
}
