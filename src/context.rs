//! The shared context: ring tables, modulus chain, encoder, refresh data.
//!
//! A [`Context`] owns every derived table; ciphertexts, keys and transforms
//! borrow it immutably. After construction (and the optional
//! [`Context::enable_recryption`]) the context is never mutated, so it can
//! be shared freely across ciphertexts and worker threads.

use crate::bootstrap::RecryptData;
use crate::encoding::SlotEncoder;
use crate::error::{state_err, Result};
use crate::params::BgvParams;
use crate::ring::{Cyclotomic, ModulusChain, PrimeSet};

/// Ring parameters, prime tables and (optionally) refresh data.
#[derive(Debug)]
pub struct Context {
    id: u64,
    params: BgvParams,
    cyclo: Cyclotomic,
    chain: ModulusChain,
    encoder: Option<SlotEncoder>,
    recrypt: Option<RecryptData>,
}

/// Contexts built from equal parameters are structurally identical (the
/// prime chain is deterministic), so the fingerprint doubles as a
/// compatibility tag for ciphertexts and keys.
fn fingerprint(params: &BgvParams) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut h = std::collections::hash_map::DefaultHasher::new();
    params.m.hash(&mut h);
    params.p.hash(&mut h);
    params.r.hash(&mut h);
    params.bits.hash(&mut h);
    params.prime_bits.hash(&mut h);
    params.n_special.hash(&mut h);
    h.finish()
}

impl Context {
    /// Builds a context from validated parameters. The slot encoder is
    /// present when the plaintext prime splits completely.
    pub fn new(params: BgvParams) -> Result<Self> {
        params.validate()?;
        let cyclo = Cyclotomic::new(params.m);
        let chain = ModulusChain::generate(
            params.bits,
            params.prime_bits,
            params.n_special,
            params.p,
        );
        let encoder = if params.is_totally_split() {
            Some(SlotEncoder::new(params.m, params.p)?)
        } else {
            None
        };
        Ok(Self {
            id: fingerprint(&params),
            params,
            cyclo,
            chain,
            encoder,
            recrypt: None,
        })
    }

    /// Compatibility tag carried by ciphertexts and keys.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn params(&self) -> &BgvParams {
        &self.params
    }

    pub fn m(&self) -> usize {
        self.params.m
    }

    pub fn p(&self) -> u64 {
        self.params.p
    }

    pub fn r(&self) -> usize {
        self.params.r
    }

    /// The native plaintext space p^r.
    pub fn ptxt_space(&self) -> u64 {
        self.params.ptxt_space()
    }

    /// Ring degree φ(m).
    pub fn phi(&self) -> usize {
        self.cyclo.phi()
    }

    pub fn chain(&self) -> &ModulusChain {
        &self.chain
    }

    pub fn cyclo(&self) -> &Cyclotomic {
        &self.cyclo
    }

    /// The slot encoder; errors when the prime does not split completely.
    pub fn encoder(&self) -> Result<&SlotEncoder> {
        self.encoder
            .as_ref()
            .ok_or_else(|| state_err!("context has no slot encoder (p does not split mod m)"))
    }

    /// Installs refresh data; must be called before bootstrapping. Calling
    /// it twice replaces the data (a warning is logged by the builder).
    pub fn enable_recryption(&mut self) -> Result<()> {
        if self.recrypt.is_some() {
            tracing::warn!("refresh data initialized more than once; replacing");
        }
        let data = RecryptData::build(self)?;
        self.recrypt = Some(data);
        Ok(())
    }

    /// The refresh data; errors when [`Context::enable_recryption`] has not
    /// run.
    pub fn recrypt_data(&self) -> Result<&RecryptData> {
        self.recrypt
            .as_ref()
            .ok_or_else(|| state_err!("no refresh data: call enable_recryption first"))
    }

    /// High-probability bound on the noise of a fresh encryption.
    pub fn fresh_noise_bound(&self) -> f64 {
        let phi = self.phi() as f64;
        self.ptxt_space() as f64 * (0.5 + self.params.sigma * phi.sqrt() * 6.0)
    }

    /// High-probability coefficient bound used during refresh parameter
    /// selection: a bound on |w0 + w1·s| for w uniform in [-1/2, 1/2] and s
    /// the ternary secret.
    pub fn bound_for_recryption(&self) -> f64 {
        let phi = self.phi() as f64;
        0.5 * (1.0 + 2.0 * phi / 3.0)
    }

    /// Additive noise introduced by one mod-switch, relative to the
    /// plaintext space of the switched ciphertext.
    pub fn mod_switch_added_noise(&self, ptxt_space: u64) -> f64 {
        let phi = self.phi() as f64;
        ptxt_space as f64 * (phi / 12.0).sqrt() * (1.0 + (phi * 2.0 / 3.0).sqrt())
    }

    /// log2 of the product of the primes in `set`.
    pub fn log2_of_set(&self, set: &PrimeSet) -> f64 {
        self.chain.log2_product(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_split() {
        let ctx = Context::new(BgvParams::split_m16_p17(2, 120)).unwrap();
        assert_eq!(ctx.phi(), 8);
        assert_eq!(ctx.ptxt_space(), 289);
        assert!(ctx.encoder().is_ok());
        assert!(ctx.recrypt_data().is_err());
    }

    #[test]
    fn test_context_non_split_has_no_encoder() {
        let ctx = Context::new(BgvParams::new(15, 2, 1, 120)).unwrap();
        assert!(ctx.encoder().is_err());
    }

    #[test]
    fn test_noise_bounds_positive() {
        let ctx = Context::new(BgvParams::split_m16_p17(2, 120)).unwrap();
        assert!(ctx.fresh_noise_bound() > 0.0);
        assert!(ctx.bound_for_recryption() > 0.0);
        assert!(ctx.mod_switch_added_noise(289) > 0.0);
    }
}
