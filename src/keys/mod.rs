//! Key material: secret keys, public keys, key-switching matrices.

pub mod public;
pub mod secret;
pub mod switching;

pub use public::PublicKey;
pub use secret::{exponent_of, SecretKey};
pub use switching::{KeySwitchMatrix, KS_DIGIT_BASE};
