//! Ciphertext refreshment: parameter selection and the thick/thin
//! bootstrapping pipelines.

pub mod params;
pub mod recrypt;
pub mod thin;

pub use params::{compute_fudge, select_parameters, RecryptData};
pub use recrypt::Bootstrapper;
pub use thin::ThinBootstrapper;
