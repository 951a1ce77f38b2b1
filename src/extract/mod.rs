//! Digit extraction: lifting polynomials, the Paterson–Stockmeyer
//! evaluator, and the trapezoid scheduler.

pub mod digits;
pub mod eval;
pub mod polynomials;

pub use digits::DigitExtractor;
pub use eval::{all_odd, choose_parameters, eval_poly_family, spacing, DynamicPowers, PsParams};
pub use polynomials::{digit_retain_poly, LiftingPolyCache, SUPPORTED};
