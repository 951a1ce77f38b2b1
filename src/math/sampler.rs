//! Samplers for secrets and encryption errors.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Gaussian sampler for error polynomials.
pub struct GaussianSampler {
    sigma: f64,
    rng: ChaCha20Rng,
}

impl GaussianSampler {
    /// Creates a new Gaussian sampler with given standard deviation.
    pub fn new(sigma: f64) -> Self {
        Self {
            sigma,
            rng: ChaCha20Rng::from_entropy(),
        }
    }

    /// Creates a seeded sampler for reproducibility.
    pub fn with_seed(sigma: f64, seed: u64) -> Self {
        Self {
            sigma,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Samples from a discrete Gaussian using the Box-Muller transform.
    pub fn sample(&mut self) -> i64 {
        let u1: f64 = self.rng.gen_range(0.0001..1.0);
        let u2: f64 = self.rng.gen_range(0.0..1.0);

        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        (z * self.sigma).round() as i64
    }

    /// Samples a vector of n signed Gaussian values.
    pub fn sample_vec(&mut self, n: usize) -> Vec<i64> {
        (0..n).map(|_| self.sample()).collect()
    }

    /// Samples a ternary vector in {-1, 0, 1}, each coefficient independent.
    pub fn sample_ternary(&mut self, n: usize) -> Vec<i64> {
        (0..n).map(|_| self.rng.gen_range(-1..=1)).collect()
    }

    /// The configured standard deviation.
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Direct access to the underlying RNG, for uniform sampling.
    pub fn rng(&mut self) -> &mut ChaCha20Rng {
        &mut self.rng
    }
}
