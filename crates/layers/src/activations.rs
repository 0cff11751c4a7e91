//! Activation functions applied inside feed-forward stacks.

use std::sync::Arc;

use candle_core::{Error, Result, Tensor};

/// Supported activation choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    /// Pass-through, useful for purely linear stacks.
    Identity,
    /// Rectified linear unit.
    Relu,
}

/// Elementwise non-linearity applied between dense projections.
pub trait Activation: Send + Sync {
    fn kind(&self) -> ActivationKind;
    fn forward(&self, input: &Tensor) -> Result<Tensor>;
}

/// Returns a shared activation implementation for the given kind.
pub fn builtin(kind: ActivationKind) -> Arc<dyn Activation> {
    match kind {
        ActivationKind::Identity => Arc::new(Identity),
        ActivationKind::Relu => Arc::new(Relu),
    }
}

struct Identity;

impl Activation for Identity {
    fn kind(&self) -> ActivationKind {
        ActivationKind::Identity
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        Ok(input.clone())
    }
}

struct Relu;

impl Activation for Relu {
    fn kind(&self) -> ActivationKind {
        ActivationKind::Relu
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        if !input.dtype().is_float() {
            return Err(Error::Msg(format!(
                "relu expects a float tensor, got {:?}",
                input.dtype()
            )));
        }
        input.relu()
    }
}
