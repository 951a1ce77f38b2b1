//! The cyclotomic quotient ring Z[X]/Φ_m(X).
//!
//! Φ_m is computed once per context by exact polynomial division, together
//! with reduction rows expressing X^j mod Φ_m for φ(m) ≤ j < m. Since
//! Φ_m(X) divides X^m − 1, exponents are first folded modulo m; only the
//! window [φ(m), m) then needs the precomputed rows.

/// Euler totient by trial-division factorization.
pub fn euler_phi(mut n: usize) -> usize {
    let mut result = n;
    let mut p = 2;
    while p * p <= n {
        if n % p == 0 {
            while n % p == 0 {
                n /= p;
            }
            result -= result / p;
        }
        p += 1;
    }
    if n > 1 {
        result -= result / n;
    }
    result
}

/// Coefficients of the m-th cyclotomic polynomial, ascending degree.
///
/// Computed as Φ_m = (X^m − 1) / Π_{d|m, d<m} Φ_d by exact division.
pub fn cyclotomic_poly(m: usize) -> Vec<i64> {
    assert!(m >= 1);
    if m == 1 {
        return vec![-1, 1]; // X - 1
    }

    // X^m - 1
    let mut numerator = vec![0i128; m + 1];
    numerator[0] = -1;
    numerator[m] = 1;

    for d in 1..m {
        if m % d == 0 {
            let phi_d: Vec<i128> = cyclotomic_poly(d).into_iter().map(|c| c as i128).collect();
            numerator = exact_div(&numerator, &phi_d);
        }
    }

    numerator
        .into_iter()
        .map(|c| i64::try_from(c).expect("cyclotomic coefficient overflows i64"))
        .collect()
}

/// Exact division of integer polynomials, panics on nonzero remainder.
fn exact_div(num: &[i128], den: &[i128]) -> Vec<i128> {
    let dn = num.len() - 1;
    let dd = den.len() - 1;
    assert!(dn >= dd);
    assert_eq!(den[dd], 1, "divisor must be monic");

    let mut rem: Vec<i128> = num.to_vec();
    let mut quot = vec![0i128; dn - dd + 1];
    for i in (0..=dn - dd).rev() {
        let c = rem[i + dd];
        quot[i] = c;
        if c != 0 {
            for j in 0..=dd {
                rem[i + j] -= c * den[j];
            }
        }
    }
    assert!(rem.iter().all(|&c| c == 0), "division is not exact");
    quot
}

/// Precomputed reduction data for Z[X]/Φ_m(X).
#[derive(Clone, Debug)]
pub struct Cyclotomic {
    m: usize,
    phi: usize,
    /// Φ_m coefficients, ascending, length phi + 1, monic.
    phi_coeffs: Vec<i64>,
    /// rows[j - phi] = coefficients of X^j mod Φ_m, for phi <= j < m.
    rows: Vec<Vec<i64>>,
}

impl Cyclotomic {
    pub fn new(m: usize) -> Self {
        let phi_coeffs = cyclotomic_poly(m);
        let phi = phi_coeffs.len() - 1;
        debug_assert_eq!(phi, euler_phi(m));

        // X^phi mod Phi = -(lower part of Phi); then multiply by X repeatedly.
        let mut rows: Vec<Vec<i64>> = Vec::with_capacity(m - phi);
        if m > phi {
            let first: Vec<i64> = phi_coeffs[..phi].iter().map(|&c| -c).collect();
            rows.push(first);
            for j in phi + 1..m {
                let prev = &rows[j - phi - 1];
                let mut next = vec![0i64; phi];
                let top = prev[phi - 1];
                // shift up by one, folding X^phi via the first row
                for i in (1..phi).rev() {
                    next[i] = prev[i - 1];
                }
                if top != 0 {
                    for i in 0..phi {
                        next[i] = next[i]
                            .checked_add(
                                top.checked_mul(rows[0][i]).expect("reduction row overflow"),
                            )
                            .expect("reduction row overflow");
                    }
                }
                rows.push(next);
            }
        }

        Self { m, phi, phi_coeffs, rows }
    }

    /// Cyclotomic index m.
    pub fn m(&self) -> usize {
        self.m
    }

    /// Ring degree φ(m).
    pub fn phi(&self) -> usize {
        self.phi
    }

    /// Φ_m coefficients, ascending degree.
    pub fn poly(&self) -> &[i64] {
        &self.phi_coeffs
    }

    /// Reduces a coefficient vector indexed by exponents 0..m (already folded
    /// modulo m) to length φ(m), working modulo the scalar prime q.
    pub fn reduce_mod_q(&self, folded: &[u64], q: u64) -> Vec<u64> {
        debug_assert_eq!(folded.len(), self.m);
        let mut out: Vec<u64> = folded[..self.phi].to_vec();
        for j in self.phi..self.m {
            let c = folded[j];
            if c == 0 {
                continue;
            }
            let row = &self.rows[j - self.phi];
            for i in 0..self.phi {
                let r = row[i];
                if r == 0 {
                    continue;
                }
                let term = mul_signed_mod(c, r, q);
                out[i] = add_mod(out[i], term, q);
            }
        }
        out
    }

    /// Multiplies two length-φ(m) residue vectors modulo (q, Φ_m).
    pub fn mul_mod_q(&self, a: &[u64], b: &[u64], q: u64) -> Vec<u64> {
        debug_assert_eq!(a.len(), self.phi);
        debug_assert_eq!(b.len(), self.phi);

        // schoolbook convolution, exponents folded modulo m on the fly
        let mut folded = vec![0u64; self.m];
        for (i, &ai) in a.iter().enumerate() {
            if ai == 0 {
                continue;
            }
            for (j, &bj) in b.iter().enumerate() {
                if bj == 0 {
                    continue;
                }
                let e = (i + j) % self.m;
                let prod = ((ai as u128 * bj as u128) % q as u128) as u64;
                folded[e] = add_mod(folded[e], prod, q);
            }
        }
        self.reduce_mod_q(&folded, q)
    }

    /// Applies the automorphism X → X^k to a length-φ(m) residue vector,
    /// modulo q. Requires gcd(k, m) = 1.
    pub fn automorph_mod_q(&self, a: &[u64], k: usize, q: u64) -> Vec<u64> {
        debug_assert_eq!(a.len(), self.phi);
        let mut folded = vec![0u64; self.m];
        for (i, &ai) in a.iter().enumerate() {
            if ai == 0 {
                continue;
            }
            let e = (i * k) % self.m;
            folded[e] = add_mod(folded[e], ai, q);
        }
        self.reduce_mod_q(&folded, q)
    }
}

#[inline]
fn add_mod(a: u64, b: u64, q: u64) -> u64 {
    let s = a as u128 + b as u128;
    (s % q as u128) as u64
}

#[inline]
fn mul_signed_mod(a: u64, s: i64, q: u64) -> u64 {
    let mag = ((a as u128 * s.unsigned_abs() as u128) % q as u128) as u64;
    if s >= 0 {
        mag
    } else if mag == 0 {
        0
    } else {
        q - mag
    }
}
