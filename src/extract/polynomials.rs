//! Lifting-polynomial cache.
//!
//! A lifting polynomial f for (p, e_inner, e) satisfies, for every integer
//! x, f(x) ≡ x̄ (mod p^e) where x̄ is the centered representative of
//! x mod p^{e_inner} (for p = 2 the representative lies in [-h, h) with
//! h = 2^{e_inner−1}). Evaluating f on a ciphertext whose low digits are
//! correct therefore isolates those digits at a higher precision, which is
//! the digit-peeling step of the trapezoid.
//!
//! Polynomials are either generated (exact Newton interpolation in the
//! falling-factorial basis, then conversion to the monomial basis) or
//! loaded from the on-disk layout `poly{p}_{e_inner}_{e}.txt`, one decimal
//! coefficient per line in ascending degree order.

use std::collections::HashMap;
use std::path::Path;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::error::{arg_err, Error, Result};
use crate::math::{mod_inverse, pow_u64, Zq};

/// The closed list of supported (p, e_inner) pairs.
pub const SUPPORTED: &[(u64, usize)] = &[(2, 1), (3, 1), (5, 1), (17, 1), (29, 1)];

/// Cache of lifting polynomials, immutable after construction.
#[derive(Clone, Debug, Default)]
pub struct LiftingPolyCache {
    /// (p, e_inner) → polynomials for targets e_inner+1, e_inner+2, …
    table: HashMap<(u64, usize), Vec<Vec<i64>>>,
}

impl LiftingPolyCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates and installs the polynomials for one (p, e_inner) pair up
    /// to target precision `max_e`.
    pub fn generate(&mut self, p: u64, e_inner: usize, max_e: usize) -> Result<()> {
        if !SUPPORTED.contains(&(p, e_inner)) {
            return Err(arg_err!(
                "(p, e_inner) = ({}, {}) is not in the supported list",
                p,
                e_inner
            ));
        }
        let entry = self.table.entry((p, e_inner)).or_default();
        for target in e_inner + 1 + entry.len()..=max_e {
            entry.push(digit_retain_poly(p, e_inner, target)?);
        }
        Ok(())
    }

    /// Looks up the polynomial for the given target precision.
    pub fn get(&self, p: u64, e_inner: usize, target: usize) -> Result<&[i64]> {
        let missing = || Error::MissingLiftingPolynomial {
            p,
            e_inner,
            precision: target,
        };
        if target <= e_inner {
            return Err(missing());
        }
        self.table
            .get(&(p, e_inner))
            .and_then(|v| v.get(target - e_inner - 1))
            .map(|v| v.as_slice())
            .ok_or_else(missing)
    }

    /// Loads a cache from a directory with files
    /// `poly{p}_{e_inner}_{e}.txt`, scanning targets upward from
    /// e_inner + 1 until a file is missing, for every supported pair.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut cache = Self::new();
        for &(p, e_inner) in SUPPORTED {
            let mut target = e_inner + 1;
            loop {
                let path = dir.join(format!("poly{}_{}_{}.txt", p, e_inner, target));
                if !path.exists() {
                    break;
                }
                let text = std::fs::read_to_string(&path)?;
                let coeffs = parse_polynomial(&text, pow_u64(p, target))
                    .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
                cache
                    .table
                    .entry((p, e_inner))
                    .or_default()
                    .push(coeffs);
                target += 1;
            }
        }
        Ok(cache)
    }

    /// Writes every cached polynomial into the on-disk layout.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        for (&(p, e_inner), polys) in &self.table {
            for (i, poly) in polys.iter().enumerate() {
                let target = e_inner + 1 + i;
                let path = dir.join(format!("poly{}_{}_{}.txt", p, e_inner, target));
                let text: String = poly
                    .iter()
                    .map(|c| format!("{}\n", c))
                    .collect();
                std::fs::write(path, text)?;
            }
        }
        Ok(())
    }

    /// Number of cached polynomials.
    pub fn len(&self) -> usize {
        self.table.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_polynomial(text: &str, modulus: u64) -> std::result::Result<Vec<i64>, String> {
    let mut out = Vec::new();
    for tok in text.split_whitespace() {
        let v: BigInt = tok
            .parse()
            .map_err(|_| format!("bad coefficient {:?}", tok))?;
        let r = v.mod_floor(&BigInt::from(modulus));
        let r = r.to_u64().ok_or("reduction failed")?;
        out.push(Zq::to_signed(r, modulus));
    }
    if out.is_empty() {
        return Err("empty polynomial file".into());
    }
    Ok(out)
}

/// The digit representative of v modulo p^{e_inner}: balanced (centered)
/// for odd p, unbalanced in [0, p^{e_inner}) for p = 2, where no balanced
/// representation exists — this is also the convention of the hard-coded
/// squaring cascade, whose first step x² ≡ x₀ (mod 4) produces bits in
/// {0, 1}.
pub fn centered_digit(v: i64, p: u64, e_inner: usize) -> i64 {
    let q = pow_u64(p, e_inner) as i64;
    let r = v.rem_euclid(q);
    if p != 2 && r > q / 2 {
        r - q
    } else {
        r
    }
}

/// Computes the digit-retain polynomial for (p, e_inner, target).
///
/// Newton interpolation: with F(x) the retain function, the falling-
/// factorial coefficients are a_k = Δ^k F(0) / k!, which are p-adically
/// integral exactly because F is polynomially representable mod p^e. The
/// series truncates at the first k with ν_p(k!) ≥ e, where (x)_k vanishes
/// identically modulo p^e.
pub fn digit_retain_poly(p: u64, e_inner: usize, target: usize) -> Result<Vec<i64>> {
    if target <= e_inner {
        return Err(arg_err!("target {} must exceed e_inner {}", target, e_inner));
    }
    let p2e = pow_u64(p, target);

    // truncation index: nu_p(k!) >= target
    let mut k_max = 0usize;
    let mut nu = 0usize;
    while nu < target {
        k_max += 1;
        nu += p_adic_valuation(k_max as u64, p);
    }

    // finite differences of the retain function
    let mut values: Vec<BigInt> = (0..=k_max as i64)
        .map(|x| BigInt::from(centered_digit(x, p, e_inner)))
        .collect();
    let mut newton: Vec<BigInt> = Vec::with_capacity(k_max + 1);
    newton.push(values[0].clone());
    for _ in 1..=k_max {
        for i in 0..values.len() - 1 {
            values[i] = &values[i + 1] - &values[i];
        }
        values.pop();
        newton.push(values[0].clone());
    }

    // a_k = Delta^k F(0) / k!, divided p-adically
    let p_big = BigInt::from(p);
    let mut falling_coeffs: Vec<u64> = Vec::with_capacity(k_max + 1);
    let mut k_factorial_unit = BigInt::from(1u64); // k! with p-part removed, mod p^e
    let mut k_fact_val = 0usize;
    for (k, diff) in newton.iter().enumerate() {
        if k > 0 {
            let mut kk = BigInt::from(k as u64);
            while (&kk % &p_big).is_zero() {
                kk /= &p_big;
                k_fact_val += 1;
            }
            k_factorial_unit = (&k_factorial_unit * kk).mod_floor(&BigInt::from(p2e));
        }

        let mut d = diff.clone();
        for _ in 0..k_fact_val {
            if (&d % &p_big).is_zero() {
                d /= &p_big;
            } else {
                return Err(arg_err!(
                    "retain function not polynomially representable at k = {}",
                    k
                ));
            }
        }
        let d_mod = bigint_mod(&d, p2e);
        let unit = k_factorial_unit.to_u64().expect("unit fits u64");
        let unit_inv = mod_inverse(unit, p2e).expect("unit part invertible");
        falling_coeffs.push(Zq::mul(d_mod, unit_inv, p2e));
    }

    // convert from falling-factorial to monomial basis:
    // basis_k(X) = X(X-1)...(X-k+1), built incrementally mod p^e
    let mut coeffs = vec![0u64; k_max + 1];
    let mut basis = vec![0u64; k_max + 1];
    basis[0] = 1;
    let mut basis_deg = 0usize;
    for (k, &a_k) in falling_coeffs.iter().enumerate() {
        if k > 0 {
            // basis *= (X - (k-1))
            let shift = Zq::from_signed(-((k - 1) as i64), p2e);
            for i in (0..=basis_deg).rev() {
                let b = basis[i];
                basis[i + 1] = Zq::add(basis[i + 1], b, p2e);
                basis[i] = Zq::mul(b, shift, p2e);
            }
            basis_deg += 1;
        }
        if a_k != 0 {
            for i in 0..=basis_deg {
                coeffs[i] = Zq::add(coeffs[i], Zq::mul(a_k, basis[i], p2e), p2e);
            }
        }
    }

    while coeffs.len() > 1 && *coeffs.last().unwrap() == 0 {
        coeffs.pop();
    }
    Ok(coeffs.iter().map(|&c| Zq::to_signed(c, p2e)).collect())
}

fn p_adic_valuation(mut n: u64, p: u64) -> usize {
    let mut v = 0;
    while n % p == 0 {
        n /= p;
        v += 1;
    }
    v
}

fn bigint_mod(x: &BigInt, q: u64) -> u64 {
    let r = x.mod_floor(&BigInt::from(q));
    debug_assert!(!r.is_negative());
    r.to_u64().expect("reduced value fits u64")
}

/// Plain-integer evaluation of a polynomial mod q (test and verification
/// helper).
pub fn eval_poly_mod(coeffs: &[i64], x: i64, q: u64) -> i64 {
    let mut acc = 0u64;
    let xq = Zq::from_signed(x, q);
    for &c in coeffs.iter().rev() {
        acc = Zq::add(Zq::mul(acc, xq, q), Zq::from_signed(c, q), q);
    }
    Zq::to_signed(acc, q)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_retain_property(p: u64, e_inner: usize, target: usize) {
        let poly = digit_retain_poly(p, e_inner, target).unwrap();
        let p2e = pow_u64(p, target);
        let step = (p2e / 4096).max(1);
        let mut x = 0u64;
        while x < p2e {
            let want = centered_digit(x as i64, p, e_inner);
            let got = eval_poly_mod(&poly, x as i64, p2e);
            assert_eq!(
                got.rem_euclid(p2e as i64),
                want.rem_euclid(p2e as i64),
                "p={} e_inner={} target={} at x={}",
                p,
                e_inner,
                target,
                x
            );
            x += step;
        }
    }

    #[test]
    fn test_retain_p2() {
        for target in 2..=8 {
            check_retain_property(2, 1, target);
        }
    }

    #[test]
    fn test_retain_p3() {
        for target in 2..=6 {
            check_retain_property(3, 1, target);
        }
    }

    #[test]
    fn test_retain_p17() {
        for target in 2..=4 {
            check_retain_property(17, 1, target);
        }
    }

    #[test]
    fn test_retain_exhaustive_small() {
        // exhaustive over the full residue ring, no sampling step shortcut
        let poly = digit_retain_poly(3, 1, 3).unwrap();
        let q = 27u64;
        for x in 0..q {
            let want = centered_digit(x as i64, 3, 1);
            let got = eval_poly_mod(&poly, x as i64, q);
            assert_eq!(got.rem_euclid(27), want.rem_euclid(27), "x={}", x);
        }
    }

    #[test]
    fn test_cache_generate_and_get() {
        let mut cache = LiftingPolyCache::new();
        cache.generate(3, 1, 5).unwrap();
        assert!(cache.get(3, 1, 2).is_ok());
        assert!(cache.get(3, 1, 5).is_ok());
        assert!(matches!(
            cache.get(3, 1, 6),
            Err(Error::MissingLiftingPolynomial { .. })
        ));
        assert!(matches!(
            cache.get(7, 1, 2),
            Err(Error::MissingLiftingPolynomial { .. })
        ));
    }

    #[test]
    fn test_cache_rejects_unsupported_pair() {
        let mut cache = LiftingPolyCache::new();
        assert!(cache.generate(11, 1, 4).is_err());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = LiftingPolyCache::new();
        cache.generate(2, 1, 6).unwrap();
        cache.generate(3, 1, 4).unwrap();
        cache.save(dir.path()).unwrap();

        let loaded = LiftingPolyCache::load(dir.path()).unwrap();
        assert_eq!(loaded.len(), cache.len());
        for target in 2..=6 {
            assert_eq!(
                loaded.get(2, 1, target).unwrap(),
                cache.get(2, 1, target).unwrap()
            );
        }
    }

    #[test]
    fn test_load_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("poly2_1_2.txt"), "").unwrap();
        assert!(LiftingPolyCache::load(dir.path()).is_err());
    }

    #[test]
    fn test_centered_digit_conventions() {
        // odd p: symmetric around zero
        assert_eq!(centered_digit(2, 3, 1), -1);
        assert_eq!(centered_digit(1, 3, 1), 1);
        assert_eq!(centered_digit(0, 3, 1), 0);
        assert_eq!(centered_digit(-1, 3, 1), -1);
        // p = 2: unbalanced bits
        assert_eq!(centered_digit(1, 2, 1), 1);
        assert_eq!(centered_digit(0, 2, 1), 0);
        assert_eq!(centered_digit(-1, 2, 1), 1);
    }
}
