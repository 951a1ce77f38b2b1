//! One entry of a ciphertext: a ring element tagged with its handle.

use serde::{Deserialize, Serialize};

use crate::ring::RingElem;

use super::handle::SkHandle;

/// A ring element together with the secret-key polynomial it multiplies at
/// decryption.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CtxtPart {
    pub elem: RingElem,
    pub handle: SkHandle,
}

impl CtxtPart {
    pub fn new(elem: RingElem, handle: SkHandle) -> Self {
        Self { elem, handle }
    }
}
