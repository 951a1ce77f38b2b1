//! Homomorphic digit extraction.
//!
//! The input ciphertext holds, in each slot, an integer whose low
//! `bot_high + r` base-p digits are meaningful. Row i of the trapezoid
//! isolates digit i by evaluating lifting polynomials on the row input,
//! subtracts every sufficiently precise extracted digit from the later
//! rows, and divides by p — an exact ring operation given the divisibility
//! the subtraction establishes. After `bot_high` rows the accumulator holds
//! the high digits alone.
//!
//! For p = 2 a correction constant p^{bot_high}/2 is added first, because a
//! balanced digit representation does not exist in base 2; the hard-coded
//! multivariate cascade then lifts bit pairs with the literal coefficient
//! sets f8 and f16.

use rayon::prelude::*;

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::error::{state_err, Result};
use crate::keys::PublicKey;
use crate::options::{EvalStats, Options};

use super::eval::eval_poly_family;
use super::polynomials::LiftingPolyCache;

/// The digit-extraction engine: borrows the shared read-only tables and
/// carries the per-invocation options.
pub struct DigitExtractor<'a> {
    pub cache: &'a LiftingPolyCache,
    pub pk: &'a PublicKey,
    pub ctx: &'a Context,
    pub opts: Options,
    /// Splitting exponents for the function-composition strategy; the
    /// leading entry is the precision of the row input.
    pub compose_list: Vec<usize>,
}

impl<'a> DigitExtractor<'a> {
    pub fn new(
        cache: &'a LiftingPolyCache,
        pk: &'a PublicKey,
        ctx: &'a Context,
        opts: Options,
    ) -> Self {
        Self {
            cache,
            pk,
            ctx,
            opts,
            compose_list: vec![1],
        }
    }

    /// Runs the trapezoid on a thinly packed ciphertext (integer values in
    /// the slots). On return `c` encrypts the high digits; the extracted
    /// low digits are returned lowest first, each at its full precision.
    ///
    /// The caller guarantees the slot values are integers; `e_prime < r`
    /// costs extra depth and is reported, matching the diagnostic of the
    /// pipeline.
    pub fn extract_thin(
        &self,
        c: &mut Ciphertext,
        bot_high: usize,
        r: usize,
        e_prime: usize,
        stats: &mut EvalStats,
    ) -> Result<Vec<Ciphertext>> {
        if e_prime < r {
            tracing::warn!(
                e_prime,
                r,
                "unfortunate parameters: digit extraction depth is unnecessarily high (e' < r)"
            );
        }
        self.trapezoid(c, bot_high, r, stats)
    }

    /// The trapezoid itself.
    fn trapezoid(
        &self,
        c: &mut Ciphertext,
        bot_high: usize,
        r: usize,
        stats: &mut EvalStats,
    ) -> Result<Vec<Ciphertext>> {
        let ctx = self.ctx;
        let p = ctx.p();
        if bot_high == 0 {
            return Ok(Vec::new());
        }

        // no balanced digits in base 2: shift by p^{bot_high}/2 up front
        if p == 2 {
            let half = 1i64 << (bot_high - 1);
            c.add_constant_scalar(half, ctx)?;
        }

        // rows[i] = (ciphertext, precision): the low `precision` digits of
        // the row value are correct, the rest is garbage
        let mut rows: Vec<(Ciphertext, usize)> = vec![(c.clone(), bot_high + r); bot_high];
        let mut digits = Vec::with_capacity(bot_high);

        for row in 0..bot_high {
            let row_input = rows[row].clone();
            let evals =
                self.row_computation(&row_input.0, bot_high - row, bot_high + r - row, stats)?;

            for next in row + 1..bot_high {
                // a previous row may already hold the required precision
                if next > row + 1 && rows[next - 1].1 + row + 1 >= next + 1 {
                    rows[next] = rows[next - 1].clone();
                    continue;
                }
                for (digit, prec) in &evals {
                    if prec + row >= next + 1 {
                        rows[next].0.add_ctxt(digit, true, ctx)?;
                        rows[next].0.divide_by_p(ctx)?;
                        rows[next].1 = rows[next].1.min(*prec) - 1;
                        break;
                    }
                }
            }

            // fold the row's highest-precision digit into the accumulator
            if bot_high > row + 1 && rows[bot_high - 1].1 + row + 1 >= bot_high + r {
                *c = rows[bot_high - 1].0.clone();
            } else {
                let (digit, _) = evals.last().expect("row produced at least one digit");
                c.add_ctxt(digit, true, ctx)?;
                c.divide_by_p(ctx)?;
            }

            let (digit, _) = evals.last().expect("row produced at least one digit");
            digits.push(digit.clone());
        }
        Ok(digits)
    }

    /// Evaluates the lifting polynomials one row needs, returning
    /// (ciphertext, precision) pairs in increasing precision order.
    fn row_computation(
        &self,
        x: &Ciphertext,
        triangle: usize,
        row_size: usize,
        stats: &mut EvalStats,
    ) -> Result<Vec<(Ciphertext, usize)>> {
        let p = self.ctx.p();
        let mut schedule = self.compose_list.clone();
        schedule.push(row_size);

        let mut out: Vec<(Ciphertext, usize)> = vec![(x.clone(), schedule[0])];
        for idx in 1..schedule.len() {
            let e_prev = schedule[idx - 1];
            let e_target = schedule[idx];
            let base = out.last().expect("seeded").0.clone();
            if p == 2 && e_prev == 1 && e_target <= 16 {
                self.row_multivariate(&base, &mut out, row_size.min(e_target), stats)?;
            } else {
                self.row_composition(
                    &base,
                    &mut out,
                    triangle.min(e_target),
                    row_size.min(e_target),
                    e_prev,
                    stats,
                )?;
            }
        }
        // the seed entry is the raw input, not an extracted digit
        out.remove(0);
        if out.is_empty() {
            return Err(state_err!("row produced no digits"));
        }
        Ok(out)
    }

    /// The hard-coded multivariate cascade for p = 2, e_inner = 1: the
    /// squaring chain x², x⁴ and the bit-lifting combinations
    /// f8 = 112·x² + (94·x² + 121·x⁴)² and
    /// f16 = 11136·x⁴ − (15364·x⁴ − 14115·f8)·(28504·x² + 8968·x⁴ − f8).
    fn row_multivariate(
        &self,
        x: &Ciphertext,
        out: &mut Vec<(Ciphertext, usize)>,
        row_size: usize,
        stats: &mut EvalStats,
    ) -> Result<()> {
        let (pk, ctx) = (self.pk, self.ctx);
        let first = out.len();

        if row_size >= 2 {
            let mut f2 = x.clone();
            f2.square(pk, ctx, stats)?;
            out.push((f2, 2));
        }
        if row_size >= 3 {
            let mut f4 = out[first].0.clone();
            f4.square(pk, ctx, stats)?;
            out.push((f4, 4));
        }
        if row_size >= 5 {
            // f8 = 112·f2 + (94·f2 + 121·f4)²
            let mut f8 = out[first].0.clone();
            f8.mul_by_scalar(112, ctx)?;

            let mut tmp = out[first].0.clone();
            tmp.mul_by_scalar(94, ctx)?;
            let mut t2 = out[first + 1].0.clone();
            t2.mul_by_scalar(121, ctx)?;
            tmp.add_ctxt(&t2, false, ctx)?;
            tmp.square(pk, ctx, stats)?;

            f8.add_ctxt(&tmp, false, ctx)?;
            out.push((f8, 8));
        }
        if row_size >= 9 {
            // f16 = 11136·f4 − (15364·f4 − 14115·f8)·(28504·f2 + 8968·f4 − f8)
            let mut f16 = out[first + 1].0.clone();
            f16.mul_by_scalar(11136, ctx)?;

            let mut left = out[first + 1].0.clone();
            left.mul_by_scalar(15364, ctx)?;
            let mut t = out[first + 2].0.clone();
            t.mul_by_scalar(14115, ctx)?;
            left.add_ctxt(&t, true, ctx)?;

            let mut right = out[first].0.clone();
            right.mul_by_scalar(28504, ctx)?;
            let mut t = out[first + 1].0.clone();
            t.mul_by_scalar(8968, ctx)?;
            right.add_ctxt(&t, false, ctx)?;
            right.add_ctxt(&out[first + 2].0, true, ctx)?;

            left.multiply_by(&right, pk, ctx, stats)?;
            f16.add_ctxt(&left, true, ctx)?;
            out.push((f16, 16));
        }
        Ok(())
    }

    /// The function-composition strategy: pick precisions e_inner·2^j,
    /// doubling until the triangle is covered, clamp to the row size, and
    /// evaluate the cache polynomials with the Paterson–Stockmeyer engine.
    fn row_composition(
        &self,
        x: &Ciphertext,
        out: &mut Vec<(Ciphertext, usize)>,
        triangle: usize,
        row_size: usize,
        e_inner: usize,
        stats: &mut EvalStats,
    ) -> Result<()> {
        let p = self.ctx.p();
        let mut polys: Vec<Vec<i64>> = Vec::new();
        let mut precisions: Vec<usize> = Vec::new();

        let mut exponent = 1usize;
        while e_inner << (exponent - 1) < triangle {
            let mut precision = e_inner << exponent;
            if precision > triangle {
                precision = if precision < row_size { triangle } else { row_size };
            }
            polys.push(self.cache.get(p, e_inner, precision)?.to_vec());
            precisions.push(precision);
            exponent += 1;
        }
        if precisions.last().map_or(true, |&last| last < row_size) {
            polys.push(self.cache.get(p, e_inner, row_size)?.to_vec());
            precisions.push(row_size);
        }

        let results = eval_poly_family(&polys, x, self.pk, self.ctx, &self.opts, stats)?;
        for (result, precision) in results.into_iter().zip(precisions) {
            out.push((result, precision));
        }
        Ok(())
    }

    /// Digit extraction on fully packed slots: unpack with the Frobenius
    /// automorphisms and the slot-isolation constants, run the trapezoid on
    /// each of the d unpacked ciphertexts (in parallel), then repack by
    /// multiplying with X^i in the slots and summing.
    pub fn extract_packed(
        &self,
        c: &mut Ciphertext,
        bot_high: usize,
        r: usize,
        e_prime: usize,
        unpack_encodings: &[Vec<i64>],
        repack_encodings: &[Vec<i64>],
        stats: &mut EvalStats,
    ) -> Result<()> {
        let (pk, ctx) = (self.pk, self.ctx);
        let d = unpack_encodings.len();
        if d == 0 || repack_encodings.len() != d {
            return Err(state_err!("unpack/repack constants missing"));
        }

        c.cleanup(pk, ctx, stats)?;

        // the d Frobenius images, each an independent ciphertext
        let base = c.clone();
        let frob: Vec<Ciphertext> = (0..d)
            .into_par_iter()
            .map(|j| {
                let mut f = base.clone();
                let mut local = EvalStats::default();
                f.frobenius(j, pk, ctx, &mut local)?;
                Ok((f, local))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .map(|(f, local)| {
                stats.absorb(local);
                f
            })
            .collect();

        // unpacked[i] = sum_j frob[j] · isolation[(i + j) mod d]
        let mut unpacked: Vec<Ciphertext> = Vec::with_capacity(d);
        for i in 0..d {
            let mut acc: Option<Ciphertext> = None;
            for (j, f) in frob.iter().enumerate() {
                let mut term = f.clone();
                term.mul_by_constant(&unpack_encodings[(i + j) % d], ctx)?;
                match &mut acc {
                    Some(a) => a.add_ctxt(&term, false, ctx)?,
                    None => acc = Some(term),
                }
            }
            unpacked.push(acc.expect("d is positive"));
        }

        // each unpacked piece goes through the trapezoid independently
        let results: Vec<(Ciphertext, EvalStats)> = unpacked
            .into_par_iter()
            .map(|mut u| {
                let mut local = EvalStats::default();
                self.extract_thin(&mut u, bot_high, r, e_prime, &mut local)?;
                Ok((u, local))
            })
            .collect::<Result<Vec<_>>>()?;

        // repack: multiply piece i by X^i encoded in the slots and sum
        let mut acc: Option<Ciphertext> = None;
        for (i, (mut piece, local)) in results.into_iter().enumerate() {
            stats.absorb(local);
            if i > 0 {
                piece.mul_by_constant(&repack_encodings[i], ctx)?;
            }
            match &mut acc {
                Some(a) => a.add_ctxt(&piece, false, ctx)?,
                None => acc = Some(piece),
            }
        }
        *c = acc.expect("d is positive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SecretKey;
    use crate::math::GaussianSampler;
    use crate::params::BgvParams;

    /// Deterministic reference for the trapezoid on plain integers (odd p):
    /// after removing bot_high balanced digits, the value is the balanced
    /// high part.
    fn plain_high_part(mut v: i64, p: i64, bot_high: usize) -> i64 {
        for _ in 0..bot_high {
            let mut d = v.rem_euclid(p);
            if d > p / 2 {
                d -= p;
            }
            v = (v - d) / p;
        }
        v
    }

    #[test]
    fn test_plain_high_part_reference() {
        // sanity for the test oracle itself
        assert_eq!(plain_high_part(7, 3, 1), 2); // 7 = 1 + 3·2
        assert_eq!(plain_high_part(8, 3, 1), 3); // 8 = -1 + 3·3
        assert_eq!(plain_high_part(100, 3, 2), 11); // 100 = 1 + 3·33 = 1 + 3·(33) ; 33 = 0+3·11
    }

    #[test]
    fn test_trapezoid_small_p17() {
        // p = 17, one digit to remove, values in slots
        let ctx = crate::context::Context::new(BgvParams::split_m16_p17(2, 700)).unwrap();
        let mut sampler = GaussianSampler::with_seed(3.2, 21);
        let sk = SecretKey::generate(&ctx, &mut sampler);
        // matrices must cover the extraction space 17^2
        let pk = PublicKey::generate_at(&sk, &ctx, &mut sampler, 2).unwrap();

        let mut cache = LiftingPolyCache::new();
        cache.generate(17, 1, 3).unwrap();

        // plaintext space 17^2, extract 1 digit with r = 1
        let p2 = 289u64;
        let slots: Vec<u64> = vec![0, 1, 16, 17, 30, 100, 200, 288];
        let coeffs = ctx.encoder().unwrap().encode(&slots, 2).unwrap();
        let mut c = sk.encrypt_at(&coeffs, p2, &ctx, &mut sampler).unwrap();

        let extractor = DigitExtractor::new(&cache, &pk, &ctx, Options::default());
        let mut stats = EvalStats::default();
        let digits = extractor.extract_thin(&mut c, 1, 1, 1, &mut stats).unwrap();
        assert_eq!(digits.len(), 1);
        assert!(stats.ctxt_mults > 0);

        // result space is 17; slots hold the balanced high part mod 17
        assert_eq!(c.ptxt_space(), 17);
        let out = sk.decrypt_slots(&c, &ctx).unwrap();
        for (i, &v) in slots.iter().enumerate() {
            let expected = plain_high_part(v as i64, 17, 1).rem_euclid(17) as u64;
            assert_eq!(out[i], expected, "slot {} (value {})", i, v);
        }
    }
}
