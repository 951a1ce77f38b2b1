//! The thin refresh pipeline, for sparsely packed ciphertexts.
//!
//! Thin bootstrapping assumes the slots hold integers (no extension-ring
//! structure to unpack): the slots are moved to coefficients *before* the
//! homomorphic decryption, the trapezoid runs directly on integer slots,
//! and the coefficients move back into slots afterwards. The unpack/repack
//! wrapper of the thick path is skipped entirely.

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::error::{state_err, Result};
use crate::extract::DigitExtractor;
use crate::keys::PublicKey;
use crate::linear::LinearTransform;
use crate::options::{EvalStats, Options};

use super::recrypt::{finish, homomorphic_decryption_input, redo_dummy};

/// Thin bootstrapping: refreshes ciphertexts whose slots hold integers.
pub struct ThinBootstrapper<'a> {
    pub pk: &'a PublicKey,
    pub ctx: &'a Context,
    pub opts: Options,
}

impl<'a> ThinBootstrapper<'a> {
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
        if original_space != ctx.ptxt_space() {
            return Err(state_err!(
                "thin refresh expects the native plaintext space {}, have {}",
                ctx.ptxt_space(),
                original_space
            ));
        }

        c.drop_special_primes(ctx)?;

        // slots to coefficients happens up front on the thin input
        rc.slot_to_coeff().apply(c, self.pk, ctx, &mut stats)?;
        tracing::debug!(capacity = c.bit_capacity(ctx), "after slots-to-coeffs");

        let (zz0, zz1) = homomorphic_decryption_input(c, self.pk, ctx, &mut stats)?;
        let saved_factor = c.int_factor();

        *c = self.pk.recrypt_key()?.clone();
        c.mul_by_constant(&zz1, ctx)?;
        c.add_constant(&zz0, ctx)?;
        tracing::debug!(capacity = c.bit_capacity(ctx), "after refresh-key combination");

        rc.coeff_to_slot().apply(c, self.pk, ctx, &mut stats)?;
        tracing::debug!(capacity = c.bit_capacity(ctx), "after coeffs-to-slots");

        // the integer-in-slot trapezoid, no unpack/repack
        let extractor = DigitExtractor::new(rc.cache(), self.pk, ctx, self.opts.clone());
        extractor.extract_thin(
            c,
            rc.digits_to_extract(),
            ctx.r(),
            rc.e_prime(),
            &mut stats,
        )?;
        tracing::debug!(capacity = c.bit_capacity(ctx), "after digit extraction");

        finish(c, saved_factor, original_space, ctx)?;
        Ok(stats)
    }

    /// Refreshes every ciphertext in the batch whose capacity has fallen
    /// below the threshold; the rest are left untouched.
    pub fn recrypt_below(
        &self,
        batch: &mut [Ciphertext],
        threshold_bits: i64,
    ) -> Result<EvalStats> {
        let mut stats = EvalStats::default();
        for c in batch.iter_mut() {
            if !c.is_empty() && c.bit_capacity(self.ctx) < threshold_bits {
                stats.absorb(self.recrypt(c)?);
            }
        }
        Ok(stats)
    }
}
