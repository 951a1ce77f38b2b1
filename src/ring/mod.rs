//! Cyclotomic ring arithmetic in CRT (residue) representation.
//!
//! The pieces a ciphertext is made of: [`PrimeSet`] index sets over the
//! [`ModulusChain`], the [`Cyclotomic`] reduction tables for Z[X]/Φ_m(X),
//! and [`RingElem`] residue vectors with the arithmetic the ciphertext
//! layer builds on (including BGV mod-switching and digit decomposition).

pub mod chain;
pub mod cyclotomic;
pub mod elem;
pub mod prime_set;

pub use chain::ModulusChain;
pub use cyclotomic::{cyclotomic_poly, euler_phi, Cyclotomic};
pub use elem::RingElem;
pub use prime_set::PrimeSet;
