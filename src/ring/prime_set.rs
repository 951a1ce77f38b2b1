//! Index sets over the CRT prime chain.
//!
//! A ciphertext lives relative to a subset of the primes in the modulus
//! chain; all its parts share one [`PrimeSet`]. Sets are kept sorted so that
//! set algebra is linear-time merges.

use serde::{Deserialize, Serialize};

/// A sorted set of indices into the modulus chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimeSet {
    indices: Vec<usize>,
}

impl PrimeSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self { indices: Vec::new() }
    }

    /// The contiguous range `[first, last]` inclusive.
    pub fn range(first: usize, last: usize) -> Self {
        Self {
            indices: (first..=last).collect(),
        }
    }

    /// Builds a set from arbitrary indices; sorts and deduplicates.
    pub fn from_indices(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }

    /// Number of primes in the set.
    pub fn card(&self) -> usize {
        self.indices.len()
    }

    /// True when the set is empty.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Smallest index, if any.
    pub fn first(&self) -> Option<usize> {
        self.indices.first().copied()
    }

    /// Largest index, if any.
    pub fn last(&self) -> Option<usize> {
        self.indices.last().copied()
    }

    /// Membership test.
    pub fn contains(&self, idx: usize) -> bool {
        self.indices.binary_search(&idx).is_ok()
    }

    /// True when every index of `self` is in `other`.
    pub fn is_subset_of(&self, other: &PrimeSet) -> bool {
        self.indices.iter().all(|&i| other.contains(i))
    }

    /// True when the two sets share no index.
    pub fn is_disjoint_from(&self, other: &PrimeSet) -> bool {
        self.indices.iter().all(|&i| !other.contains(i))
    }

    /// Set union.
    pub fn union(&self, other: &PrimeSet) -> PrimeSet {
        let mut indices = self.indices.clone();
        indices.extend_from_slice(&other.indices);
        PrimeSet::from_indices(indices)
    }

    /// Set intersection.
    pub fn intersection(&self, other: &PrimeSet) -> PrimeSet {
        PrimeSet {
            indices: self
                .indices
                .iter()
                .copied()
                .filter(|&i| other.contains(i))
                .collect(),
        }
    }

    /// Set difference `self \ other`.
    pub fn difference(&self, other: &PrimeSet) -> PrimeSet {
        PrimeSet {
            indices: self
                .indices
                .iter()
                .copied()
                .filter(|&i| !other.contains(i))
                .collect(),
        }
    }

    /// Keeps only the indices also present in `other`.
    pub fn retain(&mut self, other: &PrimeSet) {
        self.indices.retain(|&i| other.contains(i));
    }

    /// Iterates the indices in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    /// Position of `idx` within the sorted set, if present.
    pub fn position(&self, idx: usize) -> Option<usize> {
        self.indices.binary_search(&idx).ok()
    }
}
