//! The modulus chain: ciphertext primes plus special primes.
//!
//! Ciphertext primes carry the working modulus and are consumed by
//! mod-switching as noise grows; special primes exist only for the
//! key-switching detour (mod-up before digit accumulation, mod-down after).

use num_bigint::BigInt;
use num_traits::One;
use serde::{Deserialize, Serialize};

use crate::math::{mod_inverse, prime_chain};

use super::prime_set::PrimeSet;

/// The primes backing all ciphertexts of one context.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModulusChain {
    primes: Vec<u64>,
    n_ctxt: usize,
}

impl ModulusChain {
    /// Generates a chain with `ctxt_bits` total bits of ciphertext primes
    /// (in `prime_bits`-bit pieces) plus `n_special` special primes, all
    /// coprime to the plaintext prime `p`.
    pub fn generate(ctxt_bits: usize, prime_bits: u32, n_special: usize, p: u64) -> Self {
        let n_ctxt = ctxt_bits.div_ceil(prime_bits as usize);
        let primes = prime_chain(prime_bits, n_ctxt + n_special, p);
        Self { primes, n_ctxt }
    }

    /// All prime values, ciphertext primes first.
    pub fn primes(&self) -> &[u64] {
        &self.primes
    }

    /// The prime at chain index `i`.
    pub fn prime(&self, i: usize) -> u64 {
        self.primes[i]
    }

    /// Indices of the ciphertext primes.
    pub fn ctxt_primes(&self) -> PrimeSet {
        PrimeSet::range(0, self.n_ctxt - 1)
    }

    /// Indices of the special primes (empty set when none were generated).
    pub fn special_primes(&self) -> PrimeSet {
        if self.primes.len() == self.n_ctxt {
            PrimeSet::empty()
        } else {
            PrimeSet::range(self.n_ctxt, self.primes.len() - 1)
        }
    }

    /// All prime indices.
    pub fn all_primes(&self) -> PrimeSet {
        PrimeSet::range(0, self.primes.len() - 1)
    }

    /// A prime set is valid when it contains either all special primes or
    /// none of them.
    pub fn verify_prime_set(&self, set: &PrimeSet) -> bool {
        let special = self.special_primes();
        let present = set.intersection(&special).card();
        present == 0 || present == special.card()
    }

    /// Exact product of the primes in `set`.
    pub fn product(&self, set: &PrimeSet) -> BigInt {
        let mut acc = BigInt::one();
        for i in set.iter() {
            acc *= self.primes[i];
        }
        acc
    }

    /// log2 of the product of the primes in `set`.
    pub fn log2_product(&self, set: &PrimeSet) -> f64 {
        set.iter().map(|i| (self.primes[i] as f64).log2()).sum()
    }

    /// Inverse of `v` modulo each prime in `set`, in set order.
    ///
    /// Returns `None` when `v` shares a factor with some prime (impossible
    /// for the plaintext prime by construction).
    pub fn inverses_of(&self, v: u64, set: &PrimeSet) -> Option<Vec<u64>> {
        set.iter()
            .map(|i| mod_inverse(v % self.primes[i], self.primes[i]))
            .collect()
    }
}
