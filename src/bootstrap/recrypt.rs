//! The thick refresh pipeline.
//!
//! A refresh takes a noisy ciphertext with plaintext space dividing p^r and
//! produces a fresh one encrypting the same value: drop to a small prime
//! set, key-switch to the refresh key, raw mod-switch to q = p^e + 1, make
//! the residues divisible by p^{e'}, divide, recombine under the encrypted
//! refresh key, move coefficients into slots, extract digits, and move the
//! slots back. The extracted high part satisfies [w]_q ≡ −B (mod p^r) once
//! e' ≥ r, so the pipeline closes with a negation before restoring the
//! integer factor.

use rand::Rng;

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::error::{state_err, Error, Result};
use crate::extract::DigitExtractor;
use crate::keys::PublicKey;
use crate::linear::LinearTransform;
use crate::math::pow_u64;
use crate::options::{EvalStats, Options};
use crate::ring::PrimeSet;

/// Fraction of the assumed bound the scaled raw-mod-switch noise may use.
pub(crate) const MIN_CAP_FRAC: f64 = 1.0;

/// Number of ciphertext primes kept for the homomorphic decryption phase.
pub(crate) const RECRYPT_PRIME_LEVELS: usize = 3;

/// Thick bootstrapping: refreshes fully packed ciphertexts.
pub struct Bootstrapper<'a> {
    pub pk: &'a PublicKey,
    pub ctx: &'a Context,
    pub opts: Options,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(pk: &'a PublicKey, ctx: &'a Context, opts: Options) -> Self {
        Self { pk, ctx, opts }
    }

    /// Refreshes `c` in place. On error the ciphertext is invalid and must
    /// be discarded.
    pub fn recrypt(&self, c: &mut Ciphertext) -> Result<EvalStats> {
        let ctx = self.ctx;
        let mut stats = EvalStats::default();
        if c.is_empty() {
            return Ok(stats);
        }
        if c.is_trivial() {
            redo_dummy(c, ctx);
            return Ok(stats);
        }

        let rc = ctx.recrypt_data()?;
        self.pk
            .recrypt_key_id()
            .ok_or_else(|| state_err!("public key has no refresh key"))?;

        let original_space = c.ptxt_space();
        if ctx.ptxt_space() % original_space != 0 {
            return Err(state_err!(
                "plaintext space {} does not divide p^r",
                original_space
            ));
        }

        let (zz0, zz1) = homomorphic_decryption_input(c, self.pk, ctx, &mut stats)?;
        let saved_factor = c.int_factor();

        // linear combination under the refresh key; the integer factor of
        // the input is restored at the very end
        *c = self.pk.recrypt_key()?.clone();
        c.mul_by_constant(&zz1, ctx)?;
        c.add_constant(&zz0, ctx)?;
        tracing::debug!(capacity = c.bit_capacity(ctx), "after refresh-key combination");

        // move the coefficients into the slots
        rc.coeff_to_slot().apply(c, self.pk, ctx, &mut stats)?;
        tracing::debug!(capacity = c.bit_capacity(ctx), "after coeffs-to-slots");

        // extract digits e' .. e-1 from the (conceptually packed) slots
        let extractor = DigitExtractor::new(rc.cache(), self.pk, ctx, self.opts.clone());
        extractor.extract_packed(
            c,
            rc.digits_to_extract(),
            ctx.r(),
            rc.e_prime(),
            rc.unpack_encodings(),
            rc.repack_encodings(),
            &mut stats,
        )?;
        tracing::debug!(capacity = c.bit_capacity(ctx), "after digit extraction");

        // move the slots back to coefficients
        rc.slot_to_coeff().apply(c, self.pk, ctx, &mut stats)?;

        finish(c, saved_factor, original_space, ctx)?;
        Ok(stats)
    }
}

/// The shared head of both pipelines: bring the ciphertext to a small
/// prime set, key-switch to the refresh key, raw mod-switch to q = p^e + 1,
/// make divisible by p^{e'} and divide. Returns the two scaled residue
/// polynomials.
pub(crate) fn homomorphic_decryption_input(
    c: &mut Ciphertext,
    pk: &PublicKey,
    ctx: &Context,
    stats: &mut EvalStats,
) -> Result<(Vec<i64>, Vec<i64>)> {
    let rc = ctx.recrypt_data()?;
    let p = ctx.p();
    let e = rc.e();
    let e_prime = rc.e_prime();
    let q = pow_u64(p, e) + 1;
    let p2e_prime = pow_u64(p, e_prime);

    c.drop_special_primes(ctx)?;
    if !c.in_canonical_form(0) {
        c.relinearize(pk, ctx, stats)?;
    }

    // keep only the first few ciphertext primes
    let s = c.prime_set().difference(&ctx.chain().special_primes());
    if s.card() > RECRYPT_PRIME_LEVELS {
        let first = s.first().expect("nonempty prime set");
        let mut target = PrimeSet::range(first, first + RECRYPT_PRIME_LEVELS - 1);
        target.retain(&s);
        c.mod_switch_down_to(&target, ctx)?;
    }

    // key-switch to the refresh key (the circular scheme keeps key id 0)
    c.relinearize(pk, ctx, stats)?;

    let (mut zz, noise_est, q_inv) = c.raw_mod_switch(q, ctx)?;
    // the parameter search allotted 2·p^r·B of the p^e budget to the
    // scaled noise; exceeding it means the refresh would not decrypt
    let noise_bnd =
        MIN_CAP_FRAC * 2.0 * ctx.ptxt_space() as f64 * ctx.bound_for_recryption();
    let ratio = noise_est / noise_bnd;
    if ratio > 1.0 {
        return Err(Error::NoiseBoundExceeded { ratio });
    }
    debug_assert_eq!(zz.len(), 2);

    // the rescaling multiplied the plaintext by Q^{-1}; record it so the
    // closing step restores the right factor
    c.mul_int_factor(q_inv);

    for part in zz.iter_mut() {
        let mut pwrfl = to_powerful_basis(std::mem::take(part));
        make_divisible(&mut pwrfl, p2e_prime, q, p);
        for z in pwrfl.iter_mut() {
            debug_assert_eq!(*z % p2e_prime as i64, 0);
            *z /= p2e_prime as i64;
        }
        *part = from_powerful_basis(pwrfl);
    }

    let zz1 = zz.pop().expect("two parts");
    let zz0 = zz.pop().expect("two parts");
    Ok((zz0, zz1))
}

/// Rounding happens in the powerful basis. For the cyclotomics this crate
/// targets, the powerful basis coincides with the power basis, so the
/// conversion is the identity; a genuine transform would slot in here.
pub(crate) fn to_powerful_basis(coeffs: Vec<i64>) -> Vec<i64> {
    coeffs
}

pub(crate) fn from_powerful_basis(coeffs: Vec<i64>) -> Vec<i64> {
    coeffs
}

/// Adds multiples of q to make every entry divisible by p2e, keeping the
/// added multiples small: z' = z + v·q with |v| ≤ p2e/2. Works because
/// q ≡ 1 (mod p2e). Ties are broken randomly for p = 2 so v has expected
/// value zero.
pub(crate) fn make_divisible(coeffs: &mut [i64], p2e: u64, q: u64, p: u64) {
    if p2e == 1 {
        return;
    }
    debug_assert_eq!(q % p2e, 1, "q must be 1 modulo p^e'");
    let mut rng = rand::thread_rng();
    let half = (p2e / 2) as i64;
    for z in coeffs.iter_mut() {
        let z_mod = z.rem_euclid(p2e as i64);
        let v = if z_mod > half || (p == 2 && z_mod == half && rng.gen::<bool>()) {
            p2e as i64 - z_mod
        } else {
            -z_mod
        };
        *z += q as i64 * v;
        debug_assert_eq!(z.rem_euclid(p2e as i64), 0);
    }
}

/// Closes a refresh: negate (since [w]_q ≡ −B mod p^r), restore the saved
/// integer factor, and restrict back to the caller's plaintext space.
pub(crate) fn finish(
    c: &mut Ciphertext,
    saved_factor: u64,
    original_space: u64,
    ctx: &Context,
) -> Result<()> {
    c.negate(ctx);
    if c.ptxt_space() != original_space {
        c.reduce_ptxt_space(original_space, ctx)?;
    }
    if saved_factor != 1 {
        c.mul_int_factor(saved_factor % original_space);
    }
    Ok(())
}

/// The trivial path: a single-constant-part ciphertext is just re-reduced
/// modulo its plaintext space.
pub(crate) fn redo_dummy(c: &mut Ciphertext, ctx: &Context) {
    use num_integer::Integer;
    use num_traits::ToPrimitive;
    let space = num_bigint::BigInt::from(c.ptxt_space());
    let half = &space / 2;
    let coeffs: Vec<i64> = c.parts()[0]
        .elem
        .to_centered_bigints(ctx.chain())
        .into_iter()
        .map(|v| {
            let mut r = v.mod_floor(&space);
            if r > half {
                r -= &space;
            }
            r.to_i64().expect("reduced coefficient fits i64")
        })
        .collect();
    let space = c.ptxt_space();
    let mut fresh = Ciphertext::dummy_encrypt(&coeffs, ctx);
    fresh.reduce_ptxt_space(space, ctx).expect("same space");
    *c = fresh;
}
