//! Secret-key handles.
//!
//! A handle names the secret-key polynomial s_k^a(X^t) a ciphertext part is
//! multiplied by at decryption. The error state of the reference design
//! (key id −1) is unrepresentable here: fallible handle products return
//! `Result` instead.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier of the secret-key polynomial s_k^a(X^t).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SkHandle {
    power_of_s: usize,
    power_of_x: usize,
    key_id: usize,
}

impl SkHandle {
    /// The constant handle: the part is added in at decryption unchanged.
    pub fn one() -> Self {
        Self {
            power_of_s: 0,
            power_of_x: 1,
            key_id: 0,
        }
    }

    /// The base handle s_k(X).
    pub fn base(key_id: usize) -> Self {
        Self {
            power_of_s: 1,
            power_of_x: 1,
            key_id,
        }
    }

    /// General handle s_k^a(X^t).
    pub fn new(power_of_s: usize, power_of_x: usize, key_id: usize) -> Self {
        Self {
            power_of_s,
            power_of_x,
            key_id,
        }
    }

    pub fn power_of_s(&self) -> usize {
        self.power_of_s
    }

    pub fn power_of_x(&self) -> usize {
        self.power_of_x
    }

    pub fn key_id(&self) -> usize {
        self.key_id
    }

    /// True when the part multiplies 1.
    pub fn is_one(&self) -> bool {
        self.power_of_s == 0
    }

    /// True when the handle is s_k(X) for the given key.
    pub fn is_base(&self, key_id: usize) -> bool {
        self.power_of_s == 1 && self.power_of_x == 1 && self.key_id == key_id
    }

    /// The handle after the ring automorphism X → X^k: t becomes t·k mod m.
    /// The constant handle is unaffected.
    pub fn automorph(&self, k: usize, m: usize) -> Self {
        if self.is_one() {
            *self
        } else {
            Self {
                power_of_s: self.power_of_s,
                power_of_x: (self.power_of_x * k) % m,
                key_id: self.key_id,
            }
        }
    }

    /// Product of two handles: powers of s add when key ids and powers of X
    /// agree; multiplying by the constant handle is the identity.
    pub fn mul(&self, other: &SkHandle) -> Result<SkHandle> {
        if self.is_one() {
            return Ok(*other);
        }
        if other.is_one() {
            return Ok(*self);
        }
        if self.key_id != other.key_id {
            return Err(Error::IncompatibleHandles(format!(
                "key ids differ: {} vs {}",
                self.key_id, other.key_id
            )));
        }
        if self.power_of_x != other.power_of_x {
            return Err(Error::IncompatibleHandles(format!(
                "powers of X differ: {} vs {}",
                self.power_of_x, other.power_of_x
            )));
        }
        Ok(SkHandle {
            power_of_s: self.power_of_s + other.power_of_s,
            power_of_x: self.power_of_x,
            key_id: self.key_id,
        })
    }
}

impl PartialEq for SkHandle {
    fn eq(&self, other: &Self) -> bool {
        // all constant handles are equal regardless of the other fields
        if self.power_of_s == 0 && other.power_of_s == 0 {
            return true;
        }
        self.power_of_s == other.power_of_s
            && self.power_of_x == other.power_of_x
            && self.key_id == other.key_id
    }
}

impl Eq for SkHandle {}
