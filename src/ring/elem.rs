//! Ring elements in residue (CRT) representation.
//!
//! A [`RingElem`] stores one coefficient vector per prime of its
//! [`PrimeSet`], always in the coefficient domain of Z[X]/Φ_m(X). The
//! element does not own the chain or the cyclotomic tables; operations take
//! them as arguments so elements stay plain data.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::math::{mod_inverse, Zq};

use super::chain::ModulusChain;
use super::cyclotomic::Cyclotomic;
use super::prime_set::PrimeSet;

/// An element of R_Q = Z_Q[X]/Φ_m(X) for Q the product of a prime set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RingElem {
    /// residues[pos][i]: coefficient i modulo the pos-th prime of `set`.
    residues: Vec<Vec<u64>>,
    set: PrimeSet,
}

impl RingElem {
    /// The zero element over `set` with ring degree `phi`.
    pub fn zero(set: PrimeSet, phi: usize) -> Self {
        let residues = (0..set.card()).map(|_| vec![0u64; phi]).collect();
        Self { residues, set }
    }

    /// Embeds an integer coefficient vector (signed, ascending degree).
    pub fn from_signed(coeffs: &[i64], set: PrimeSet, chain: &ModulusChain) -> Self {
        let residues = set
            .iter()
            .map(|idx| {
                let q = chain.prime(idx);
                coeffs.iter().map(|&c| Zq::from_signed(c, q)).collect()
            })
            .collect();
        Self { residues, set }
    }

    /// Embeds arbitrary-precision integer coefficients.
    pub fn from_bigints(coeffs: &[BigInt], set: PrimeSet, chain: &ModulusChain) -> Self {
        let residues = set
            .iter()
            .map(|idx| {
                let q = chain.prime(idx);
                coeffs.iter().map(|c| bigint_mod_u64(c, q)).collect()
            })
            .collect();
        Self { residues, set }
    }

    /// A constant (degree-0) element.
    pub fn constant(value: i64, set: PrimeSet, phi: usize, chain: &ModulusChain) -> Self {
        let mut coeffs = vec![0i64; phi];
        coeffs[0] = value;
        Self::from_signed(&coeffs, set, chain)
    }

    /// The prime set this element lives in.
    pub fn prime_set(&self) -> &PrimeSet {
        &self.set
    }

    /// Ring degree.
    pub fn phi(&self) -> usize {
        self.residues.first().map_or(0, |r| r.len())
    }

    /// True when all residues are zero.
    pub fn is_zero(&self) -> bool {
        self.residues.iter().all(|r| r.iter().all(|&c| c == 0))
    }

    pub(crate) fn residues(&self) -> &[Vec<u64>] {
        &self.residues
    }

    /// Adds `other` in place; both elements must share a prime set.
    pub fn add_assign(&mut self, other: &RingElem, chain: &ModulusChain) {
        debug_assert_eq!(self.set, other.set);
        for (pos, idx) in self.set.iter().enumerate() {
            let q = chain.prime(idx);
            for (c, &o) in self.residues[pos].iter_mut().zip(&other.residues[pos]) {
                *c = Zq::add(*c, o, q);
            }
        }
    }

    /// Subtracts `other` in place; both elements must share a prime set.
    pub fn sub_assign(&mut self, other: &RingElem, chain: &ModulusChain) {
        debug_assert_eq!(self.set, other.set);
        for (pos, idx) in self.set.iter().enumerate() {
            let q = chain.prime(idx);
            for (c, &o) in self.residues[pos].iter_mut().zip(&other.residues[pos]) {
                *c = Zq::sub(*c, o, q);
            }
        }
    }

    /// Negates in place.
    pub fn negate(&mut self, chain: &ModulusChain) {
        for (pos, idx) in self.set.iter().enumerate() {
            let q = chain.prime(idx);
            for c in self.residues[pos].iter_mut() {
                *c = Zq::negate(*c, q);
            }
        }
    }

    /// Multiplies by a signed scalar in place.
    pub fn scalar_mul_assign(&mut self, scalar: i64, chain: &ModulusChain) {
        for (pos, idx) in self.set.iter().enumerate() {
            let q = chain.prime(idx);
            let s = Zq::from_signed(scalar, q);
            for c in self.residues[pos].iter_mut() {
                *c = Zq::mul(*c, s, q);
            }
        }
    }

    /// Multiplies by the inverse of `v` modulo every prime, in place.
    ///
    /// Used for the exact divide-by-p of digit extraction and for the
    /// rescaling step of mod-switching. `v` must be coprime to the chain.
    pub fn mul_scalar_inverse(&mut self, v: u64, chain: &ModulusChain) {
        for (pos, idx) in self.set.iter().enumerate() {
            let q = chain.prime(idx);
            let inv = mod_inverse(v % q, q).expect("scalar shares a factor with a chain prime");
            for c in self.residues[pos].iter_mut() {
                *c = Zq::mul(*c, inv, q);
            }
        }
    }

    /// Ring product.
    pub fn mul(&self, other: &RingElem, chain: &ModulusChain, cyclo: &Cyclotomic) -> RingElem {
        debug_assert_eq!(self.set, other.set);
        let residues = self
            .set
            .iter()
            .enumerate()
            .map(|(pos, idx)| {
                let q = chain.prime(idx);
                cyclo.mul_mod_q(&self.residues[pos], &other.residues[pos], q)
            })
            .collect();
        RingElem {
            residues,
            set: self.set.clone(),
        }
    }

    /// Applies the automorphism F(X) → F(X^k); gcd(k, m) = 1.
    pub fn automorph(&self, k: usize, chain: &ModulusChain, cyclo: &Cyclotomic) -> RingElem {
        let residues = self
            .set
            .iter()
            .enumerate()
            .map(|(pos, idx)| {
                let q = chain.prime(idx);
                cyclo.automorph_mod_q(&self.residues[pos], k, q)
            })
            .collect();
        RingElem {
            residues,
            set: self.set.clone(),
        }
    }

    /// Centered integer coefficients modulo the product of the prime set.
    pub fn to_centered_bigints(&self, chain: &ModulusChain) -> Vec<BigInt> {
        compose_centered(&self.residues, &self.set, chain)
    }

    /// Extends the element to a superset of primes, keeping the same
    /// centered integer value.
    pub fn mod_up(&self, new_set: &PrimeSet, chain: &ModulusChain) -> RingElem {
        debug_assert!(self.set.is_subset_of(new_set));
        let ints = self.to_centered_bigints(chain);
        let mut out = RingElem::zero(new_set.clone(), self.phi());
        for (pos, idx) in new_set.iter().enumerate() {
            let q = chain.prime(idx);
            if let Some(old_pos) = self.set.position(idx) {
                out.residues[pos] = self.residues[old_pos].clone();
            } else {
                out.residues[pos] = ints.iter().map(|c| bigint_mod_u64(c, q)).collect();
            }
        }
        out
    }

    /// BGV mod-switch down to `to_set`.
    ///
    /// Computes c' = (c − δ)/D with D the product of the dropped primes and
    /// δ ≡ c (mod D), δ ≡ 0 (mod ptxt_space), per-coefficient centered. The
    /// plaintext is scaled by D^{-1} mod ptxt_space; the ciphertext layer
    /// accounts for it in the integer factor.
    pub fn mod_switch_down(
        &self,
        to_set: &PrimeSet,
        ptxt_space: u64,
        chain: &ModulusChain,
    ) -> RingElem {
        debug_assert!(to_set.is_subset_of(&self.set));
        let dropped = self.set.difference(to_set);
        if dropped.is_empty() {
            return self.clone();
        }

        let d_big = chain.product(&dropped);
        let d_mod_ptxt = bigint_mod_u64(&d_big, ptxt_space);
        let inv_d_ptxt =
            mod_inverse(d_mod_ptxt, ptxt_space).expect("dropped primes not coprime to ptxt space");

        // residues of the dropped primes only, for composing delta0
        let dropped_residues: Vec<&Vec<u64>> = dropped
            .iter()
            .map(|idx| &self.residues[self.set.position(idx).unwrap()])
            .collect();
        let delta0 = compose_centered_refs(&dropped_residues, &dropped, chain);

        // per kept prime: D mod q and its inverse
        let kept: Vec<(usize, u64, u64, u64)> = to_set
            .iter()
            .map(|idx| {
                let q = chain.prime(idx);
                let d_mod_q = bigint_mod_u64(&d_big, q);
                let inv = mod_inverse(d_mod_q, q).expect("chain primes must be distinct");
                (self.set.position(idx).unwrap(), q, d_mod_q, inv)
            })
            .collect();

        let phi = self.phi();
        let mut out = RingElem::zero(to_set.clone(), phi);
        for i in 0..phi {
            // delta = delta0 - D * u, with u chosen so delta = 0 mod ptxt_space
            let d0_mod_p = bigint_mod_u64(&delta0[i], ptxt_space);
            let u_raw = Zq::mul(d0_mod_p, inv_d_ptxt, ptxt_space);
            let u = Zq::to_signed(u_raw, ptxt_space);
            let delta = &delta0[i] - &d_big * BigInt::from(u);

            for (pos, &(old_pos, q, _d_mod_q, inv_d)) in kept.iter().enumerate() {
                let c = self.residues[old_pos][i];
                let delta_mod_q = bigint_mod_u64(&delta, q);
                let num = Zq::sub(c, delta_mod_q, q);
                out.residues[pos][i] = Zq::mul(num, inv_d, q);
            }
        }
        out
    }

    /// A uniformly random element over `set`: independent uniform residues
    /// per prime are exactly a uniform element of Z_Q by CRT.
    pub fn random<R: rand::Rng>(
        set: PrimeSet,
        phi: usize,
        chain: &ModulusChain,
        rng: &mut R,
    ) -> Self {
        let residues = set
            .iter()
            .map(|idx| {
                let q = chain.prime(idx);
                (0..phi).map(|_| rng.gen_range(0..q)).collect()
            })
            .collect();
        Self { residues, set }
    }

    /// Drops residues to a subset of primes, reducing the element modulo
    /// the smaller product. Congruences modulo the smaller product are
    /// preserved because it divides the larger one.
    pub(crate) fn restrict_to_set(&self, set: &PrimeSet) -> RingElem {
        debug_assert!(set.is_subset_of(&self.set));
        let residues = set
            .iter()
            .map(|idx| self.residues[self.set.position(idx).unwrap()].clone())
            .collect();
        RingElem {
            residues,
            set: set.clone(),
        }
    }

    /// Multiplies by an arbitrary-precision scalar in place.
    pub fn scalar_mul_big(&mut self, scalar: &BigInt, chain: &ModulusChain) {
        for (pos, idx) in self.set.iter().enumerate() {
            let q = chain.prime(idx);
            let s = bigint_mod_u64(scalar, q);
            for c in self.residues[pos].iter_mut() {
                *c = Zq::mul(*c, s, q);
            }
        }
    }

    /// Signed base-`base` digit decomposition of the centered integer
    /// representative. Returns `len` coefficient vectors, lowest digit
    /// first, each with entries in [-base/2, base/2].
    pub fn decompose_digits(&self, base: u64, len: usize, chain: &ModulusChain) -> Vec<Vec<i64>> {
        let ints = self.to_centered_bigints(chain);
        let phi = self.phi();
        let mut digits = vec![vec![0i64; phi]; len];
        let b = BigInt::from(base);
        let half = BigInt::from(base / 2);
        for i in 0..phi {
            let mut v = ints[i].clone();
            for digit in digits.iter_mut() {
                if v.is_zero() {
                    break;
                }
                let mut r = v.mod_floor(&b);
                if r > half {
                    r -= &b;
                }
                digit[i] = r.to_i64().expect("digit fits i64");
                v = (v - r) / &b;
            }
            debug_assert!(v.is_zero(), "decomposition length too short");
        }
        digits
    }
}

/// Centered CRT composition of residue vectors.
fn compose_centered(residues: &[Vec<u64>], set: &PrimeSet, chain: &ModulusChain) -> Vec<BigInt> {
    let refs: Vec<&Vec<u64>> = residues.iter().collect();
    compose_centered_refs(&refs, set, chain)
}

fn compose_centered_refs(
    residues: &[&Vec<u64>],
    set: &PrimeSet,
    chain: &ModulusChain,
) -> Vec<BigInt> {
    let q_total = chain.product(set);
    let half = &q_total / 2;
    let phi = residues.first().map_or(0, |r| r.len());

    // Q_i = Q / q_i and t_i = Q_i^{-1} mod q_i
    let basis: Vec<(BigInt, u64, u64)> = set
        .iter()
        .map(|idx| {
            let q = chain.prime(idx);
            let q_i = &q_total / q;
            let q_i_mod = bigint_mod_u64(&q_i, q);
            let t_i = mod_inverse(q_i_mod, q).expect("chain primes must be distinct");
            (q_i, q, t_i)
        })
        .collect();

    (0..phi)
        .map(|i| {
            let mut acc = BigInt::zero();
            for (pos, (q_i, q, t_i)) in basis.iter().enumerate() {
                let r = residues[pos][i];
                let scaled = Zq::mul(r, *t_i, *q);
                acc += q_i * BigInt::from(scaled);
            }
            acc = acc.mod_floor(&q_total);
            if acc > half {
                acc -= &q_total;
            }
            acc
        })
        .collect()
}

/// `x mod q` for arbitrary-sign BigInt, result in [0, q).
pub(crate) fn bigint_mod_u64(x: &BigInt, q: u64) -> u64 {
    let r = x.mod_floor(&BigInt::from(q));
    debug_assert!(!r.is_negative());
    r.to_u64().expect("reduced value fits u64")
}
