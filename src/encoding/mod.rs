//! Slot encoding for totally-split plaintext algebras.
//!
//! When m divides p − 1, the cyclotomic polynomial factors into φ(m) linear
//! terms modulo every power p^k, so the plaintext ring Z_{p^k}[X]/Φ_m(X)
//! splits into φ(m) degree-one slots. A slot value is the evaluation of the
//! plaintext polynomial at one primitive m-th root of unity; encoding is
//! Lagrange interpolation, decoding is evaluation.
//!
//! Slots are indexed by the exponents i ∈ (Z/mZ)^* in increasing order:
//! slot i holds u(ζ^i) for a fixed primitive root ζ. The Galois element t
//! then acts on slot indices by i → i·t mod m, which is what the linear
//! transform layer relies on.

use serde::{Deserialize, Serialize};

use crate::error::{arg_err, Result};
use crate::math::{mod_inverse, Zq};

/// Per-exponent encoding tables for one power p^k.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct LevelTables {
    /// p^k.
    modulus: u64,
    /// roots[j] = ζ^{exponents[j]} mod p^k.
    roots: Vec<u64>,
    /// lagrange[j] = coefficients of L_j(X) with L_j(roots[i]) = [i == j].
    lagrange: Vec<Vec<u64>>,
}

/// Encoder for a totally-split plaintext algebra.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlotEncoder {
    m: usize,
    p: u64,
    /// Slot labels: the elements of (Z/mZ)^* in increasing order.
    exponents: Vec<usize>,
    /// Tables for p^1 .. p^max_e, indexed by k − 1.
    levels: Vec<LevelTables>,
}

impl SlotEncoder {
    /// Builds an encoder covering plaintext spaces p^1 through p^max, where
    /// max is the largest exponent with p^max below 2^62.
    ///
    /// Fails with `InvalidArgument` when p does not split completely
    /// (m ∤ p − 1).
    pub fn new(m: usize, p: u64) -> Result<Self> {
        if (p - 1) % m as u64 != 0 {
            return Err(arg_err!(
                "p = {} does not split completely modulo m = {}",
                p,
                m
            ));
        }

        let exponents: Vec<usize> = (1..m).filter(|&i| crate::math::gcd(i as u64, m as u64) == 1).collect();
        let zeta = primitive_root_of_unity(m as u64, p)?;

        let mut levels = Vec::new();
        let mut modulus = p;
        let mut root = zeta;
        loop {
            let roots: Vec<u64> = exponents
                .iter()
                .map(|&i| Zq::pow(root, i as u64, modulus))
                .collect();
            let lagrange = lagrange_basis(&roots, modulus)?;
            levels.push(LevelTables {
                modulus,
                roots,
                lagrange,
            });

            match modulus.checked_mul(p) {
                Some(next) if next < (1u64 << 62) => {
                    root = hensel_lift(root, m as u64, modulus, next, p);
                    modulus = next;
                }
                _ => break,
            }
        }

        Ok(Self {
            m,
            p,
            exponents,
            levels,
        })
    }

    /// Number of slots, φ(m).
    pub fn n_slots(&self) -> usize {
        self.exponents.len()
    }

    /// The slot labels: exponents i with slot value u(ζ^i).
    pub fn exponents(&self) -> &[usize] {
        &self.exponents
    }

    /// Largest supported plaintext exponent.
    pub fn max_exponent(&self) -> usize {
        self.levels.len()
    }

    fn level(&self, k: usize) -> Result<&LevelTables> {
        self.levels
            .get(k.wrapping_sub(1))
            .ok_or_else(|| arg_err!("no encoding tables for exponent {}", k))
    }

    /// Encodes slot values into plaintext-polynomial coefficients mod p^k.
    pub fn encode(&self, slots: &[u64], k: usize) -> Result<Vec<i64>> {
        let tables = self.level(k)?;
        if slots.len() != self.n_slots() {
            return Err(arg_err!(
                "expected {} slot values, got {}",
                self.n_slots(),
                slots.len()
            ));
        }
        let q = tables.modulus;
        let phi = self.n_slots();
        let mut coeffs = vec![0u64; phi];
        for (j, &s) in slots.iter().enumerate() {
            let s = s % q;
            if s == 0 {
                continue;
            }
            for (c, &l) in coeffs.iter_mut().zip(&tables.lagrange[j]) {
                *c = Zq::add(*c, Zq::mul(s, l, q), q);
            }
        }
        Ok(coeffs.into_iter().map(|c| Zq::to_signed(c, q)).collect())
    }

    /// Decodes plaintext-polynomial coefficients into slot values mod p^k.
    pub fn decode(&self, coeffs: &[i64], k: usize) -> Result<Vec<u64>> {
        let tables = self.level(k)?;
        let q = tables.modulus;
        let reduced: Vec<u64> = coeffs.iter().map(|&c| Zq::from_signed(c, q)).collect();
        Ok(tables
            .roots
            .iter()
            .map(|&zeta| horner(&reduced, zeta, q))
            .collect())
    }

    /// A plaintext with 1 in slot `i` and 0 elsewhere, mod p^k. Used by
    /// replication and by the slot-isolation step of packed extraction.
    pub fn unit_selector(&self, i: usize, k: usize) -> Result<Vec<i64>> {
        if i >= self.n_slots() {
            return Err(arg_err!("slot index {} out of range", i));
        }
        let mut slots = vec![0u64; self.n_slots()];
        slots[i] = 1;
        self.encode(&slots, k)
    }

    /// The evaluation (Vandermonde) matrix at exponent k: entry [j][i] is
    /// ζ_j^i, so slots = V · coeffs. Its inverse is the slots-to-
    /// coefficients map.
    pub fn vandermonde(&self, k: usize) -> Result<Vec<Vec<u64>>> {
        let tables = self.level(k)?;
        let q = tables.modulus;
        let n = self.n_slots();
        Ok(tables
            .roots
            .iter()
            .map(|&zeta| {
                let mut row = Vec::with_capacity(n);
                let mut acc = 1u64;
                for _ in 0..n {
                    row.push(acc);
                    acc = Zq::mul(acc, zeta, q);
                }
                row
            })
            .collect())
    }

    /// The modulus p^k served by the level-k tables.
    pub fn level_modulus(&self, k: usize) -> Result<u64> {
        Ok(self.level(k)?.modulus)
    }

    /// The permutation of slot positions induced by the Galois element t:
    /// after applying X → X^t, position `out[j]` holds what position j held.
    ///
    /// Slot j holds u(ζ^{i_j}); the transformed plaintext at ζ^{i_j} is
    /// u(ζ^{i_j t}), so position j reads the old slot labeled i_j·t mod m.
    pub fn galois_permutation(&self, t: usize) -> Result<Vec<usize>> {
        if crate::math::gcd(t as u64, self.m as u64) != 1 {
            return Err(arg_err!("galois element {} not coprime to m", t));
        }
        self.exponents
            .iter()
            .map(|&i| {
                let target = (i * t) % self.m;
                self.exponents
                    .binary_search(&target)
                    .map_err(|_| arg_err!("exponent {} missing from slot labels", target))
            })
            .collect()
    }
}

/// Evaluates a polynomial at x via Horner's rule, mod q.
fn horner(coeffs: &[u64], x: u64, q: u64) -> u64 {
    let mut acc = 0u64;
    for &c in coeffs.iter().rev() {
        acc = Zq::add(Zq::mul(acc, x, q), c, q);
    }
    acc
}

/// Finds an element of exact multiplicative order m modulo the prime p.
fn primitive_root_of_unity(m: u64, p: u64) -> Result<u64> {
    let cofactor = (p - 1) / m;
    let prime_divisors = distinct_prime_divisors(m);
    for candidate in 2..p.min(2000) {
        let z = Zq::pow(candidate, cofactor, p);
        if z == 1 {
            continue;
        }
        if prime_divisors.iter().all(|&q| Zq::pow(z, m / q, p) != 1) {
            return Ok(z);
        }
    }
    Err(arg_err!("no primitive {}-th root of unity modulo {}", m, p))
}

fn distinct_prime_divisors(mut n: u64) -> Vec<u64> {
    let mut out = Vec::new();
    let mut d = 2;
    while d * d <= n {
        if n % d == 0 {
            out.push(d);
            while n % d == 0 {
                n /= d;
            }
        }
        d += 1;
    }
    if n > 1 {
        out.push(n);
    }
    out
}

/// Lifts a root of x^m − 1 from mod `from` to mod `to` (one more factor p).
fn hensel_lift(z: u64, m: u64, _from: u64, to: u64, _p: u64) -> u64 {
    // Newton step: z' = z - (z^m - 1) / (m z^{m-1}), all mod `to`.
    let zm = Zq::pow(z, m, to);
    let f = Zq::sub(zm, 1, to);
    let deriv = Zq::mul(m % to, Zq::pow(z, m - 1, to), to);
    let inv = mod_inverse(deriv, to).expect("derivative invertible for simple roots");
    Zq::sub(z, Zq::mul(f, inv, to), to)
}

/// Lagrange basis polynomials over distinct points, coefficients mod q.
fn lagrange_basis(points: &[u64], q: u64) -> Result<Vec<Vec<u64>>> {
    let n = points.len();

    // master polynomial M(X) = prod (X - x_i)
    let mut master = vec![0u64; n + 1];
    master[0] = 1;
    let mut deg = 0;
    for &x in points {
        let neg_x = Zq::negate(x, q);
        // multiply master by (X - x)
        for i in (0..=deg).rev() {
            let c = master[i];
            master[i + 1] = Zq::add(master[i + 1], c, q);
            master[i] = Zq::mul(c, neg_x, q);
        }
        deg += 1;
    }

    let mut basis = Vec::with_capacity(n);
    for (j, &xj) in points.iter().enumerate() {
        // Q_j(X) = M(X) / (X - x_j), synthetic division
        let mut quotient = vec![0u64; n];
        let mut carry = 0u64;
        for i in (0..n).rev() {
            carry = Zq::add(master[i + 1], Zq::mul(carry, xj, q), q);
            quotient[i] = carry;
        }

        // scale by 1 / Q_j(x_j)
        let denom = horner(&quotient, xj, q);
        let inv = mod_inverse(denom, q)
            .ok_or_else(|| arg_err!("interpolation points not distinct modulo p"))?;
        for c in quotient.iter_mut() {
            *c = Zq::mul(*c, inv, q);
        }
        basis.push(quotient);
    }
    Ok(basis)
}
