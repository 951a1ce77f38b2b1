//! Per-invocation evaluation options and statistics.
//!
//! The reference design kept these as process-wide flags and a global
//! relinearization counter; here they are values threaded through the call
//! stack, and the counter is returned to the caller.

/// Whether to force the baby-step/giant-step evaluator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ForceBsgs {
    #[default]
    Auto,
    On,
    Off,
}

/// Whether to suppress hoisted automorphism precomputation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ForceHoist {
    #[default]
    Auto,
    Off,
}

/// Options recognized by the evaluation stack.
#[derive(Clone, Debug)]
pub struct Options {
    pub force_bsgs: ForceBsgs,
    pub force_hoist: ForceHoist,
    /// Maximum recursion depth of the replication helpers.
    pub replicate_recursion_bound: usize,
    /// Defer relinearization of giant-step products until after the
    /// following addition.
    pub lazy_relinearize: bool,
    pub verbose: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            force_bsgs: ForceBsgs::Auto,
            force_hoist: ForceHoist::Auto,
            replicate_recursion_bound: 64,
            lazy_relinearize: false,
            verbose: false,
        }
    }
}

impl Options {
    /// Options with lazy relinearization switched on.
    pub fn lazy() -> Self {
        Self {
            lazy_relinearize: true,
            ..Self::default()
        }
    }
}

/// Counters reported back from an evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvalStats {
    /// Relinearization (key-switch) calls performed.
    pub relinearizations: usize,
    /// Ciphertext-by-ciphertext multiplications performed.
    pub ctxt_mults: usize,
}

impl EvalStats {
    pub fn absorb(&mut self, other: EvalStats) {
        self.relinearizations += other.relinearizations;
        self.ctxt_mults += other.ctxt_mults;
    }
}
