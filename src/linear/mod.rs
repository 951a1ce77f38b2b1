//! Slot-wise linear transforms (the EvalMap of the refresh pipeline).
//!
//! A Z_{p^k}-linear map on slots is realized as Σ_t κ_t ⊙ σ_t(c) over the
//! Galois elements t: the automorphism σ_t permutes the slots, and the
//! encoded constant κ_t selects the diagonal of the matrix that this
//! permutation exposes. With degree-one slots the Galois action is regular,
//! so the diagonals cover every matrix entry exactly once.

use std::sync::OnceLock;

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::error::{arg_err, state_err, Result};
use crate::keys::PublicKey;
use crate::math::{mod_inverse, Zq};
use crate::options::EvalStats;
use crate::ring::{PrimeSet, RingElem};

/// A precomputed linear transform applied to a ciphertext in place.
pub trait LinearTransform {
    fn apply(
        &self,
        c: &mut Ciphertext,
        pk: &PublicKey,
        ctx: &Context,
        stats: &mut EvalStats,
    ) -> Result<()>;
}

/// An encoded plaintext constant with a cheap integer-polynomial form and a
/// one-shot upgrade to the expanded residue form for a fixed prime set.
#[derive(Debug)]
pub struct EncodedConstant {
    coeffs: Vec<i64>,
    expanded: OnceLock<RingElem>,
}

impl EncodedConstant {
    pub fn new(coeffs: Vec<i64>) -> Self {
        Self {
            coeffs,
            expanded: OnceLock::new(),
        }
    }

    pub fn coeffs(&self) -> &[i64] {
        &self.coeffs
    }

    /// Installs the expanded representation for `set`. Later calls are
    /// no-ops; the first install wins.
    pub fn upgrade(&self, set: &PrimeSet, ctx: &Context) {
        let _ = self
            .expanded
            .set(RingElem::from_signed(&self.coeffs, set.clone(), ctx.chain()));
    }

    /// The residue form over `set`: the upgraded copy when it matches,
    /// otherwise a fresh embedding.
    pub fn elem_for(&self, set: &PrimeSet, ctx: &Context) -> RingElem {
        match self.expanded.get() {
            Some(e) if e.prime_set() == set => e.clone(),
            _ => RingElem::from_signed(&self.coeffs, set.clone(), ctx.chain()),
        }
    }

    /// Largest coefficient magnitude, for noise accounting.
    pub fn magnitude(&self) -> u64 {
        self.coeffs.iter().map(|c| c.unsigned_abs()).max().unwrap_or(0)
    }
}

impl Clone for EncodedConstant {
    fn clone(&self) -> Self {
        Self::new(self.coeffs.clone())
    }
}

/// One rotate-and-scale term of a matrix transform.
#[derive(Clone, Debug)]
struct Diagonal {
    galois: usize,
    constant: EncodedConstant,
}

/// A matrix-vector product over slots.
#[derive(Clone, Debug)]
pub struct MatMulTransform {
    diagonals: Vec<Diagonal>,
    /// Exponent k of the plaintext space p^k the constants are encoded at.
    exponent: usize,
}

impl MatMulTransform {
    /// Builds the transform realizing `slots_out = matrix · slots_in`, with
    /// entries modulo p^k.
    pub fn from_matrix(matrix: &[Vec<u64>], k: usize, ctx: &Context) -> Result<Self> {
        let enc = ctx.encoder()?;
        let n = enc.n_slots();
        if matrix.len() != n || matrix.iter().any(|row| row.len() != n) {
            return Err(arg_err!("matrix must be {}x{}", n, n));
        }

        let m = ctx.m();
        let mut diagonals = Vec::new();
        for t in (1..m).filter(|&t| crate::math::gcd(t as u64, m as u64) == 1) {
            // after sigma_t, position j reads old slot perm[j]; the constant
            // at position j must be the matrix entry [j][perm[j]]
            let perm = enc.galois_permutation(t)?;
            let slots: Vec<u64> = (0..n).map(|j| matrix[j][perm[j]]).collect();
            if slots.iter().all(|&v| v == 0) {
                continue;
            }
            let coeffs = enc.encode(&slots, k)?;
            diagonals.push(Diagonal {
                galois: t,
                constant: EncodedConstant::new(coeffs),
            });
        }
        Ok(Self {
            diagonals,
            exponent: k,
        })
    }

    /// The identity transform (empty product shortcut used in tests).
    pub fn identity(k: usize, ctx: &Context) -> Result<Self> {
        let n = ctx.encoder()?.n_slots();
        let matrix: Vec<Vec<u64>> = (0..n)
            .map(|i| (0..n).map(|j| (i == j) as u64).collect())
            .collect();
        Self::from_matrix(&matrix, k, ctx)
    }

    /// Number of nonzero diagonals.
    pub fn n_diagonals(&self) -> usize {
        self.diagonals.len()
    }

    /// Pre-expands every constant for the given prime set.
    pub fn upgrade_constants(&self, set: &PrimeSet, ctx: &Context) {
        for d in &self.diagonals {
            d.constant.upgrade(set, ctx);
        }
    }
}

impl LinearTransform for MatMulTransform {
    fn apply(
        &self,
        c: &mut Ciphertext,
        pk: &PublicKey,
        ctx: &Context,
        stats: &mut EvalStats,
    ) -> Result<()> {
        let expected = crate::math::pow_u64(ctx.p(), self.exponent);
        if c.ptxt_space() != expected {
            return Err(state_err!(
                "transform encoded for plaintext space {}, ciphertext has {}",
                expected,
                c.ptxt_space()
            ));
        }

        let mut acc: Option<Ciphertext> = None;
        for d in &self.diagonals {
            let mut term = c.clone();
            if d.galois != 1 {
                term.smart_automorph(d.galois, pk, ctx, stats)?;
            }
            mul_by_encoded(&mut term, &d.constant, ctx);
            match &mut acc {
                Some(a) => a.add_ctxt(&term, false, ctx)?,
                None => acc = Some(term),
            }
        }
        *c = acc.unwrap_or_else(|| Ciphertext::zero_like(c, ctx));
        Ok(())
    }
}

/// Multiplies a ciphertext by an encoded constant, using the upgraded
/// representation when available.
fn mul_by_encoded(c: &mut Ciphertext, konst: &EncodedConstant, ctx: &Context) {
    let elem = konst.elem_for(&c.prime_set, ctx);
    for part in &mut c.parts {
        part.elem = part.elem.mul(&elem, ctx.chain(), ctx.cyclo());
    }
    c.noise_bound *= (konst.magnitude() as f64 * ctx.phi() as f64).max(1.0);
}

/// Inverts a matrix modulo p^k by Gaussian elimination; pivots are chosen
/// coprime to p (the matrix must be invertible modulo p).
pub fn invert_matrix_mod(matrix: &[Vec<u64>], modulus: u64, p: u64) -> Result<Vec<Vec<u64>>> {
    let n = matrix.len();
    let mut a: Vec<Vec<u64>> = matrix.to_vec();
    let mut inv: Vec<Vec<u64>> = (0..n)
        .map(|i| (0..n).map(|j| (i == j) as u64).collect())
        .collect();

    for col in 0..n {
        let pivot_row = (col..n)
            .find(|&r| a[r][col] % p != 0)
            .ok_or_else(|| arg_err!("matrix not invertible modulo {}", p))?;
        a.swap(col, pivot_row);
        inv.swap(col, pivot_row);

        let pivot_inv = mod_inverse(a[col][col], modulus)
            .ok_or_else(|| arg_err!("pivot not invertible"))?;
        for j in 0..n {
            a[col][j] = Zq::mul(a[col][j], pivot_inv, modulus);
            inv[col][j] = Zq::mul(inv[col][j], pivot_inv, modulus);
        }
        for r in 0..n {
            if r == col || a[r][col] == 0 {
                continue;
            }
            let factor = a[r][col];
            for j in 0..n {
                let t = Zq::mul(factor, a[col][j], modulus);
                a[r][j] = Zq::sub(a[r][j], t, modulus);
                let t = Zq::mul(factor, inv[col][j], modulus);
                inv[r][j] = Zq::sub(inv[r][j], t, modulus);
            }
        }
    }
    Ok(inv)
}

/// The slots-to-coefficients transform at exponent k.
///
/// Slots relate to coefficients by s = V·c with V the Vandermonde matrix
/// of the roots. Moving the slot values into the coefficients means the
/// new coefficient vector c' must equal the old slot vector s, i.e. the
/// new slot vector is V·s — the transform applies V.
pub fn slots_to_coeffs(k: usize, ctx: &Context) -> Result<MatMulTransform> {
    let enc = ctx.encoder()?;
    let v = enc.vandermonde(k)?;
    MatMulTransform::from_matrix(&v, k, ctx)
}

/// The coefficients-to-slots transform at exponent k: the inverse of
/// [`slots_to_coeffs`], applying V^{-1} so the new slot vector equals the
/// old coefficient vector.
pub fn coeffs_to_slots(k: usize, ctx: &Context) -> Result<MatMulTransform> {
    let enc = ctx.encoder()?;
    let v = enc.vandermonde(k)?;
    let modulus = enc.level_modulus(k)?;
    let v_inv = invert_matrix_mod(&v, modulus, ctx.p())?;
    MatMulTransform::from_matrix(&v_inv, k, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SecretKey;
    use crate::math::GaussianSampler;
    use crate::params::BgvParams;

    fn setup() -> (Context, SecretKey, PublicKey, GaussianSampler) {
        let ctx = Context::new(BgvParams::split_m16_p17(2, 240)).unwrap();
        let mut sampler = GaussianSampler::with_seed(3.2, 11);
        let sk = SecretKey::generate(&ctx, &mut sampler);
        let pk = PublicKey::generate(&sk, &ctx, &mut sampler).unwrap();
        (ctx, sk, pk, sampler)
    }

    #[test]
    fn test_invert_matrix_mod() {
        let q = 289u64;
        let m = vec![vec![1, 2], vec![3, 4]];
        let inv = invert_matrix_mod(&m, q, 17).unwrap();
        // check M * M^{-1} = I
        for i in 0..2 {
            for j in 0..2 {
                let mut acc = 0u64;
                for l in 0..2 {
                    acc = Zq::add(acc, Zq::mul(m[i][l], inv[l][j], q), q);
                }
                assert_eq!(acc, (i == j) as u64);
            }
        }
    }

    #[test]
    fn test_identity_transform_keeps_slots() {
        let (ctx, sk, pk, mut sampler) = setup();
        let slots: Vec<u64> = vec![9, 8, 7, 6, 5, 4, 3, 2];
        let mut c = sk.encrypt_slots(&slots, &ctx, &mut sampler).unwrap();
        let id = MatMulTransform::identity(2, &ctx).unwrap();
        let mut stats = EvalStats::default();
        id.apply(&mut c, &pk, &ctx, &mut stats).unwrap();
        assert_eq!(sk.decrypt_slots(&c, &ctx).unwrap(), slots);
    }

    #[test]
    fn test_permutation_matrix_transform() {
        let (ctx, sk, pk, mut sampler) = setup();
        let n = 8usize;
        // cyclic shift matrix: out[j] = in[(j + 1) % n]
        let matrix: Vec<Vec<u64>> = (0..n)
            .map(|j| (0..n).map(|i| (i == (j + 1) % n) as u64).collect())
            .collect();
        let tr = MatMulTransform::from_matrix(&matrix, 2, &ctx).unwrap();

        let slots: Vec<u64> = vec![10, 20, 30, 40, 50, 60, 70, 80];
        let mut c = sk.encrypt_slots(&slots, &ctx, &mut sampler).unwrap();
        let mut stats = EvalStats::default();
        tr.apply(&mut c, &pk, &ctx, &mut stats).unwrap();

        let d = sk.decrypt_slots(&c, &ctx).unwrap();
        let expected: Vec<u64> = (0..n).map(|j| slots[(j + 1) % n]).collect();
        assert_eq!(d, expected);
    }

    #[test]
    fn test_slots_to_coeffs_then_back() {
        let (ctx, sk, pk, mut sampler) = setup();
        let slots: Vec<u64> = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let mut c = sk.encrypt_slots(&slots, &ctx, &mut sampler).unwrap();

        let s2c = slots_to_coeffs(2, &ctx).unwrap();
        let c2s = coeffs_to_slots(2, &ctx).unwrap();

        let mut stats = EvalStats::default();
        s2c.apply(&mut c, &pk, &ctx, &mut stats).unwrap();

        // after slots-to-coeffs, the plaintext coefficients are the values
        let coeffs = sk.decrypt(&c, &ctx).unwrap();
        for (i, &s) in slots.iter().enumerate() {
            assert_eq!(coeffs[i].rem_euclid(289) as u64, s, "coefficient {}", i);
        }

        c2s.apply(&mut c, &pk, &ctx, &mut stats).unwrap();
        assert_eq!(sk.decrypt_slots(&c, &ctx).unwrap(), slots);
    }

    #[test]
    fn test_encoded_constant_upgrade() {
        let (ctx, _, _, _) = setup();
        let k = EncodedConstant::new(vec![1, 0, -2, 0, 0, 0, 0, 3]);
        let set = ctx.chain().ctxt_primes();
        k.upgrade(&set, &ctx);
        let e1 = k.elem_for(&set, &ctx);
        let direct = RingElem::from_signed(k.coeffs(), set, ctx.chain());
        assert_eq!(e1, direct);
    }
}
