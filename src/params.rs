//! Parameter sets for the BGV refresh scheme.
//!
//! Parameters pin down the cyclotomic ring, the plaintext space `p^r`, and
//! the shape of the ciphertext modulus chain. They are validated before a
//! context is built; invalid combinations are rejected up front rather than
//! surfacing as decryption failures later.

use serde::{Deserialize, Serialize};

use crate::error::{arg_err, Result};
use crate::math::{gcd, is_prime};
use crate::ring::euler_phi;

/// Core parameters for a BGV context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BgvParams {
    /// Cyclotomic index m; the ring is Z[X]/Φ_m(X) of degree φ(m).
    pub m: usize,

    /// Plaintext prime p, coprime to m.
    pub p: u64,

    /// Plaintext exponent; the native plaintext space is p^r.
    pub r: usize,

    /// Total bits of ciphertext primes in the modulus chain.
    pub bits: usize,

    /// Bits per chain prime. 30-bit primes keep every scalar product inside
    /// u128 and the raw mod-switch modulus p^e + 1 inside a word.
    pub prime_bits: u32,

    /// Number of special primes reserved for key switching.
    pub n_special: usize,

    /// Standard deviation of the encryption error.
    pub sigma: f64,
}

impl BgvParams {
    /// Creates a parameter set with the default prime shape (30-bit chain
    /// primes, 2 special primes, σ = 3.2).
    pub fn new(m: usize, p: u64, r: usize, bits: usize) -> Self {
        Self {
            m,
            p,
            r,
            bits,
            prime_bits: 30,
            n_special: 2,
            sigma: 3.2,
        }
    }

    /// A small totally-split test set: m = 16, p = 17 (17 ≡ 1 mod 16), so
    /// the ring has φ(16) = 8 degree-one slots.
    pub fn split_m16_p17(r: usize, bits: usize) -> Self {
        Self::new(16, 17, r, bits)
    }

    /// A small odd-prime split set: m = 7, p = 29 (29 ≡ 1 mod 7), six
    /// degree-one slots.
    pub fn split_m7_p29(r: usize, bits: usize) -> Self {
        Self::new(7, 29, r, bits)
    }

    /// Ring degree φ(m).
    pub fn phi_m(&self) -> usize {
        euler_phi(self.m)
    }

    /// The plaintext space p^r.
    pub fn ptxt_space(&self) -> u64 {
        let mut acc = 1u64;
        for _ in 0..self.r {
            acc = acc.checked_mul(self.p).expect("p^r overflows u64");
        }
        acc
    }

    /// Multiplicative order of p modulo m: the degree d of each slot.
    /// The slot count is φ(m)/d.
    pub fn ord_p(&self) -> usize {
        let m = self.m as u64;
        let mut v = self.p % m;
        let mut ord = 1;
        while v != 1 {
            v = v * (self.p % m) % m;
            ord += 1;
            assert!(ord <= self.m, "p is not coprime to m");
        }
        ord
    }

    /// True when the plaintext prime splits completely, i.e. every slot has
    /// degree one. Holds exactly when m divides p − 1.
    pub fn is_totally_split(&self) -> bool {
        self.ord_p() == 1
    }

    /// Validates the parameter set.
    pub fn validate(&self) -> Result<()> {
        if self.m < 2 {
            return Err(arg_err!("m must be at least 2, got {}", self.m));
        }
        if !is_prime(self.p) {
            return Err(arg_err!("plaintext modulus p = {} must be prime", self.p));
        }
        if gcd(self.p, self.m as u64) != 1 {
            return Err(arg_err!("p = {} must be coprime to m = {}", self.p, self.m));
        }
        if self.r == 0 {
            return Err(arg_err!("plaintext exponent r must be positive"));
        }
        let mut acc: u128 = 1;
        for _ in 0..self.r {
            acc *= self.p as u128;
            if acc > u64::MAX as u128 {
                return Err(arg_err!("p^r does not fit in 64 bits"));
            }
        }
        if self.bits < self.prime_bits as usize {
            return Err(arg_err!(
                "chain needs at least one prime: bits = {} < prime_bits = {}",
                self.bits,
                self.prime_bits
            ));
        }
        if !(20..=60).contains(&self.prime_bits) {
            return Err(arg_err!("prime_bits = {} out of range", self.prime_bits));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_presets_valid() {
        let p = BgvParams::split_m16_p17(2, 300);
        assert!(p.validate().is_ok());
        assert_eq!(p.phi_m(), 8);
        assert!(p.is_totally_split());

        let p = BgvParams::split_m7_p29(1, 300);
        assert!(p.validate().is_ok());
        assert_eq!(p.phi_m(), 6);
        assert!(p.is_totally_split());
    }

    #[test]
    fn test_ord_p() {
        // 2 has order 12 modulo 105
        let p = BgvParams::new(105, 2, 1, 300);
        assert_eq!(p.ord_p(), 12);
        assert!(!p.is_totally_split());
    }

    #[test]
    fn test_ptxt_space() {
        let p = BgvParams::split_m16_p17(3, 300);
        assert_eq!(p.ptxt_space(), 17 * 17 * 17);
    }

    #[test]
    fn test_validate_rejects_bad_params() {
        // composite p
        assert!(BgvParams::new(16, 15, 1, 300).validate().is_err());
        // p divides m
        assert!(BgvParams::new(34, 17, 1, 300).validate().is_err());
        // r = 0
        assert!(BgvParams::new(16, 17, 0, 300).validate().is_err());
        // empty chain
        assert!(BgvParams::new(16, 17, 1, 10).validate().is_err());
    }
}
