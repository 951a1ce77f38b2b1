//! Public keys: encryption, relinearization, smart automorphisms, and the
//! refresh key.
//!
//! The public key owns the key-switching matrices. Relinearization brings a
//! ciphertext back to the canonical handle list {1, s}; the smart
//! automorphism interleaves key switching with (possibly decomposed)
//! automorphism steps so every intermediate is relinearizable.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ciphertext::{Ciphertext, CtxtPart, SkHandle};
use crate::context::Context;
use crate::error::{arg_err, state_err, Result};
use crate::math::{gcd, GaussianSampler, Zq};
use crate::options::EvalStats;
use crate::ring::RingElem;

use super::secret::SecretKey;
use super::switching::KeySwitchMatrix;

/// Public encryption key, key-switching matrices and refresh key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicKey {
    context_id: u64,
    /// An encryption of zero under the base key, for public encryption.
    enc_zero: Ciphertext,
    matrices: Vec<KeySwitchMatrix>,
    /// (power_of_s, power_of_x, key_id) → index into `matrices`.
    matrix_index: HashMap<(usize, usize, usize), usize>,
    /// Galois element → sequence of generator steps whose product is the
    /// element; every step has a key-switching matrix.
    galois_paths: HashMap<usize, Vec<usize>>,
    /// Index of the key the refresh pipeline switches to.
    recrypt_key_id: Option<usize>,
    /// The refresh key: an encryption of the secret key under itself.
    recrypt_ekey: Option<Ciphertext>,
}

/// The units of Z/mZ, excluding 1.
fn galois_elements(m: usize) -> Vec<usize> {
    (2..m).filter(|&k| gcd(k as u64, m as u64) == 1).collect()
}

impl PublicKey {
    /// Generates a public key with matrices for relinearization (s^2 → s)
    /// and for every Galois element of the group. The matrices cover
    /// plaintext spaces up to the refresh exponent when refresh data is
    /// installed, and p^r otherwise.
    pub fn generate(
        sk: &SecretKey,
        ctx: &Context,
        sampler: &mut GaussianSampler,
    ) -> Result<Self> {
        let ks_exponent = match ctx.recrypt_data() {
            Ok(rc) => rc.plaintext_exponent(),
            Err(_) => ctx.r(),
        };
        Self::generate_with_galois(sk, ctx, sampler, &galois_elements(ctx.m()), ks_exponent)
    }

    /// Generates a public key whose matrices work for plaintext spaces up
    /// to p^{ks_exponent} (noise terms in the matrices are multiples of
    /// that space, hence of every divisor).
    pub fn generate_at(
        sk: &SecretKey,
        ctx: &Context,
        sampler: &mut GaussianSampler,
        ks_exponent: usize,
    ) -> Result<Self> {
        Self::generate_with_galois(sk, ctx, sampler, &galois_elements(ctx.m()), ks_exponent)
    }

    /// Generates a public key whose automorphism matrices cover only the
    /// given Galois elements; other elements are reached by decomposing
    /// into steps (breadth-first over products of the given ones).
    pub fn generate_with_galois(
        sk: &SecretKey,
        ctx: &Context,
        sampler: &mut GaussianSampler,
        galois: &[usize],
        ks_exponent: usize,
    ) -> Result<Self> {
        if sk.context_id() != ctx.id() {
            return Err(arg_err!("secret key belongs to a different context"));
        }
        let m = ctx.m();

        let s = sk.poly().to_vec();
        let mut matrices = Vec::new();
        let mut matrix_index = HashMap::new();

        // s^2 -> s, for relinearization after multiplication
        let sq = SkHandle::new(2, 1, 0);
        let sq_poly = sk.handle_poly(&sq, ctx);
        matrix_index.insert((2, 1, 0), matrices.len());
        matrices.push(KeySwitchMatrix::generate(
            sq, 0, &s, &sq_poly, ks_exponent, ctx, sampler,
        )?);

        // s(X^t) -> s, for automorphisms
        for &t in galois {
            let h = SkHandle::new(1, t, 0);
            let h_poly = sk.handle_poly(&h, ctx);
            matrix_index.insert((1, t, 0), matrices.len());
            matrices.push(KeySwitchMatrix::generate(
                h, 0, &s, &h_poly, ks_exponent, ctx, sampler,
            )?);
        }

        let galois_paths = build_galois_paths(m, galois);

        let enc_zero = sk.encrypt(&vec![0i64; ctx.phi()], ctx, sampler)?;

        // the refresh key: Enc(s) at the bootstrap plaintext space
        let (recrypt_key_id, recrypt_ekey) = match ctx.recrypt_data() {
            Ok(rc) => {
                let space = crate::math::pow_u64(ctx.p(), rc.plaintext_exponent());
                let ekey = sk.encrypt_at(&s, space, ctx, sampler)?;
                (Some(0), Some(ekey))
            }
            Err(_) => (None, None),
        };

        Ok(Self {
            context_id: ctx.id(),
            enc_zero,
            matrices,
            matrix_index,
            galois_paths,
            recrypt_key_id,
            recrypt_ekey,
        })
    }

    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    /// Looks up the key-switching matrix for a handle.
    pub fn matrix_for(&self, handle: &SkHandle, key_id: usize) -> Option<&KeySwitchMatrix> {
        self.matrix_index
            .get(&(handle.power_of_s(), handle.power_of_x(), key_id))
            .map(|&i| &self.matrices[i])
    }

    /// The generator decomposition of a Galois element.
    pub fn automorph_path(&self, k: usize) -> Option<&[usize]> {
        self.galois_paths.get(&k).map(|v| v.as_slice())
    }

    /// The designated refresh key id, when refresh data exists.
    pub fn recrypt_key_id(&self) -> Option<usize> {
        self.recrypt_key_id
    }

    /// The refresh key ciphertext.
    pub fn recrypt_key(&self) -> Result<&Ciphertext> {
        self.recrypt_ekey
            .as_ref()
            .ok_or_else(|| state_err!("no refresh key registered"))
    }

    /// Public-key encryption: c = u·pk0 + (m + p^r·e0, p^r·e1).
    pub fn encrypt(
        &self,
        coeffs: &[i64],
        ctx: &Context,
        sampler: &mut GaussianSampler,
    ) -> Result<Ciphertext> {
        let chain = ctx.chain();
        let phi = ctx.phi();
        let space = ctx.ptxt_space();
        let set = self.enc_zero.prime_set().clone();

        let u = RingElem::from_signed(&sampler.sample_ternary(phi), set.clone(), chain);
        let mut c = self.enc_zero.clone();
        for part in &mut c.parts {
            part.elem = part.elem.mul(&u, chain, ctx.cyclo());
        }

        let mut m = vec![0i64; phi];
        for (slot, &v) in m.iter_mut().zip(coeffs) {
            *slot = Zq::to_signed(Zq::from_signed(v, space), space);
        }
        let mut e0 = RingElem::from_signed(&sampler.sample_vec(phi), set.clone(), chain);
        e0.scalar_mul_assign(space as i64, chain);
        let m_elem = RingElem::from_signed(&m, set.clone(), chain);
        c.parts[0].elem.add_assign(&m_elem, chain);
        c.parts[0].elem.add_assign(&e0, chain);

        let mut e1 = RingElem::from_signed(&sampler.sample_vec(phi), set.clone(), chain);
        e1.scalar_mul_assign(space as i64, chain);
        c.parts[1].elem.add_assign(&e1, chain);

        c.noise_bound =
            space as f64 * (0.5 + sampler.sigma() * (phi as f64) * 8.0);
        Ok(c)
    }
}

fn build_galois_paths(m: usize, galois: &[usize]) -> HashMap<usize, Vec<usize>> {
    // breadth-first closure of the available steps
    let mut paths: HashMap<usize, Vec<usize>> = HashMap::new();
    paths.insert(1, Vec::new());
    let mut frontier = vec![1usize];
    while let Some(k) = frontier.pop() {
        let base = paths[&k].clone();
        for &g in galois {
            let next = (k * g) % m;
            if !paths.contains_key(&next) {
                let mut path = base.clone();
                path.push(g);
                paths.insert(next, path);
                frontier.push(next);
            }
        }
    }
    paths
}

impl Ciphertext {
    /// Relinearizes back to the canonical handle list {1, s_key}.
    ///
    /// Applies the key-switching matrices over the digit decomposition of
    /// every non-canonical part, carrying the special-prime factor, then
    /// mod-switches back down to the original prime set.
    pub fn relinearize(
        &mut self,
        pk: &PublicKey,
        ctx: &Context,
        stats: &mut EvalStats,
    ) -> Result<()> {
        self.check_context(ctx)?;
        if pk.context_id() != ctx.id() {
            return Err(arg_err!("public key belongs to a different context"));
        }
        if self.in_canonical_form(0) {
            return Ok(());
        }

        let chain = ctx.chain();
        let special = chain.special_primes();
        let orig_set = self.prime_set.clone();
        let work = orig_set.union(&special);
        let p_sp = chain.product(&special);
        let p_sp_f = chain.log2_product(&special).exp2();

        let mut acc0 = self.parts[0].elem.mod_up(&work, chain);
        acc0.scalar_mul_big(&p_sp, chain);
        let mut acc1 = RingElem::zero(work.clone(), ctx.phi());

        let mut ks_noise = 0.0;
        for part in &self.parts[1..] {
            if part.handle.is_base(0) {
                let mut e = part.elem.mod_up(&work, chain);
                e.scalar_mul_big(&p_sp, chain);
                acc1.add_assign(&e, chain);
                continue;
            }
            let w = pk.matrix_for(&part.handle, 0).ok_or_else(|| {
                state_err!(
                    "no key-switching matrix for handle s^{}(X^{})",
                    part.handle.power_of_s(),
                    part.handle.power_of_x()
                )
            })?;
            w.apply(&part.elem, &mut acc0, &mut acc1, ctx)?;
            ks_noise += w.noise_bound() * (w.n_digits() as f64).sqrt();
        }

        self.parts = vec![
            CtxtPart::new(acc0, SkHandle::one()),
            CtxtPart::new(acc1, SkHandle::base(0)),
        ];
        self.prime_set = work;
        self.mul_int_factor(crate::ring::elem::bigint_mod_u64(&p_sp, self.ptxt_space));
        self.noise_bound = self.noise_bound * p_sp_f + ks_noise * p_sp_f;

        self.mod_switch_down_to(&orig_set, ctx)?;
        stats.relinearizations += 1;
        Ok(())
    }

    /// High-level multiplication: tensor product, mod-switch to natural
    /// size, then relinearize.
    pub fn multiply_by(
        &mut self,
        other: &Ciphertext,
        pk: &PublicKey,
        ctx: &Context,
        stats: &mut EvalStats,
    ) -> Result<()> {
        let prod = self.mult_low_level(other, ctx)?;
        *self = prod;
        self.mod_switch_to_natural(ctx)?;
        self.relinearize(pk, ctx, stats)?;
        stats.ctxt_mults += 1;
        Ok(())
    }

    /// Multiplication honoring the lazy-relinearization flag: when lazy,
    /// the product is left unrelinearized and the caller relinearizes after
    /// the following addition. An operand that is itself still
    /// unrelinearized is relinearized first, so handle lists never grow
    /// past {1, s, s²} and only the s² matrix is ever needed.
    pub fn custom_multiply_by(
        &mut self,
        other: &Ciphertext,
        pk: &PublicKey,
        ctx: &Context,
        lazy: bool,
        stats: &mut EvalStats,
    ) -> Result<()> {
        if !lazy {
            return self.multiply_by(other, pk, ctx, stats);
        }
        if !self.in_canonical_form(0) {
            self.relinearize(pk, ctx, stats)?;
        }
        let mut rhs = other;
        let rhs_owned;
        if !other.in_canonical_form(0) {
            let mut o = other.clone();
            o.relinearize(pk, ctx, stats)?;
            rhs_owned = o;
            rhs = &rhs_owned;
        }
        let prod = self.mult_low_level(rhs, ctx)?;
        *self = prod;
        self.mod_switch_to_natural(ctx)?;
        stats.ctxt_mults += 1;
        Ok(())
    }

    /// Squares the ciphertext.
    pub fn square(&mut self, pk: &PublicKey, ctx: &Context, stats: &mut EvalStats) -> Result<()> {
        let other = self.clone();
        self.multiply_by(&other, pk, ctx, stats)
    }

    /// Automorphism with relinearization, decomposed into generator steps
    /// so every intermediate result is relinearizable.
    pub fn smart_automorph(
        &mut self,
        k: usize,
        pk: &PublicKey,
        ctx: &Context,
        stats: &mut EvalStats,
    ) -> Result<()> {
        let m = ctx.m();
        let k = k % m;
        if k == 1 {
            return Ok(());
        }
        if !self.in_canonical_form(0) {
            self.relinearize(pk, ctx, stats)?;
        }
        let path = pk
            .automorph_path(k)
            .ok_or_else(|| state_err!("no automorphism path for galois element {}", k))?
            .to_vec();
        for step in path {
            self.automorph(step, ctx)?;
            self.relinearize(pk, ctx, stats)?;
        }
        Ok(())
    }

    /// The Frobenius automorphism X → X^{p^j}, with relinearization.
    pub fn frobenius(
        &mut self,
        j: usize,
        pk: &PublicKey,
        ctx: &Context,
        stats: &mut EvalStats,
    ) -> Result<()> {
        let m = ctx.m() as u64;
        let k = Zq::pow(ctx.p() % m, j as u64, m) as usize;
        self.smart_automorph(k, pk, ctx, stats)
    }

    /// Relinearize, then drop the special primes.
    pub fn cleanup(
        &mut self,
        pk: &PublicKey,
        ctx: &Context,
        stats: &mut EvalStats,
    ) -> Result<()> {
        if !self.in_canonical_form(0) {
            self.relinearize(pk, ctx, stats)?;
        }
        self.drop_special_primes(ctx)
    }
}
