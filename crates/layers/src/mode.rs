//! Explicit training/inference switch.
//!
//! Stochastic behaviour (dropout) is gated by a [`Mode`] value threaded
//! through every forward pass that uses it, rather than by module-wide mutable
//! state. Inference passes are therefore deterministic by construction.

/// Whether a forward pass runs with training-only stochastic behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Dropout active; outputs vary across calls.
    Training,
    /// All stochastic behaviour disabled; identical inputs give identical outputs.
    Inference,
}

impl Mode {
    /// Returns `true` when training-only behaviour should be applied.
    pub fn is_training(self) -> bool {
        matches!(self, Mode::Training)
    }
}
