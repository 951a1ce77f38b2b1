//! BGV homomorphic encryption with ciphertext refreshment.
//!
//! This crate implements a BGV-style scheme whose centerpiece is noise
//! refreshment: homomorphic digit extraction driven by lifting polynomials
//! and a Paterson–Stockmeyer evaluator, orchestrated by thick and thin
//! bootstrapping pipelines around a reusable refresh key.
//!
//! Key components:
//! - Ciphertexts as handle-tagged part lists over a CRT prime chain, with
//!   mod-switching as the noise-management primitive
//! - Key switching by digit decomposition with a special-prime detour
//! - The digit-extraction trapezoid with precision-tracked rows
//! - Thin and thick refresh around q = p^e + 1

pub mod bootstrap;
pub mod ciphertext;
pub mod context;
pub mod encoding;
pub mod error;
pub mod extract;
pub mod io;
pub mod keys;
pub mod linear;
pub mod math;
pub mod options;
pub mod params;
pub mod replicate;
pub mod ring;

pub use bootstrap::{Bootstrapper, RecryptData, ThinBootstrapper};
pub use ciphertext::{Ciphertext, CtxtPart, SkHandle};
pub use context::Context;
pub use error::{Error, Result};
pub use extract::{DigitExtractor, LiftingPolyCache};
pub use keys::{PublicKey, SecretKey};
pub use options::{EvalStats, ForceBsgs, ForceHoist, Options};
pub use params::BgvParams;
pub use replicate::replicate;
