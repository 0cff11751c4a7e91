//! Position-wise feed-forward stack.
//!
//! Two dense projections with a ReLU in between, applied independently at
//! every sequence position. Dropout sits between the activation and the
//! second projection and only fires in [`Mode::Training`].

use std::sync::Arc;

use candle_core::{DType, Device, Error, Result, Tensor, Var};
use candle_nn::ops;

use crate::activations::{self, Activation, ActivationKind};
use crate::checks;
use crate::dtypes::PrecisionPolicy;
use crate::linear::{Linear, LinearConfig, LinearInit};
use crate::mode::Mode;

pub const DEFAULT_INNER_DIM: usize = 2048;

/// Widths and dropout for a feed-forward stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedForwardConfig {
    pub hidden_size: usize,
    pub inner_dim: usize,
    pub dropout_p: Option<f32>,
}

impl FeedForwardConfig {
    pub fn new(hidden_size: usize) -> Self {
        Self {
            hidden_size,
            inner_dim: DEFAULT_INNER_DIM,
            dropout_p: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.hidden_size == 0 {
            return Err(Error::Msg(
                "feed-forward hidden_size must be positive".to_string(),
            ));
        }
        if self.inner_dim == 0 {
            return Err(Error::Msg(
                "feed-forward inner_dim must be positive".to_string(),
            ));
        }
        if let Some(p) = self.dropout_p {
            if !(0.0..1.0).contains(&p) {
                return Err(Error::Msg(format!(
                    "feed-forward dropout_p must lie in [0, 1), got {p}"
                )));
            }
        }
        Ok(())
    }
}

/// `dense_out(dropout(relu(dense_in(x))))` applied per position.
pub struct FeedForward {
    config: FeedForwardConfig,
    dense_in: Linear,
    dense_out: Linear,
    activation: Arc<dyn Activation>,
}

impl FeedForward {
    pub fn with_init(config: FeedForwardConfig, dtype: DType, device: &Device) -> Result<Self> {
        config.validate()?;
        let dense_in = Linear::with_init(
            LinearConfig {
                input_dim: config.hidden_size,
                output_dim: config.inner_dim,
                bias: true,
            },
            LinearInit::XavierUniform,
            dtype,
            device,
        )?;
        let dense_out = Linear::with_init(
            LinearConfig {
                input_dim: config.inner_dim,
                output_dim: config.hidden_size,
                bias: true,
            },
            LinearInit::XavierUniform,
            dtype,
            device,
        )?;
        Ok(Self {
            config,
            dense_in,
            dense_out,
            activation: activations::builtin(ActivationKind::Relu),
        })
    }

    pub fn config(&self) -> &FeedForwardConfig {
        &self.config
    }

    pub fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy, mode: Mode) -> Result<Tensor> {
        checks::expect_batch_seq_hidden("feed-forward input", hidden, self.config.hidden_size)?;
        let expanded = self.dense_in.forward(hidden, policy)?;
        let mut activated = self.activation.forward(&expanded)?;
        if mode.is_training() {
            if let Some(p) = self.config.dropout_p {
                if p > 0.0 {
                    activated = ops::dropout(&activated, p)?;
                }
            }
        }
        self.dense_out.forward(&activated, policy)
    }

    /// Exposes trainable parameters with dotted names under `scope`.
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self.dense_in.named_parameters(&format!("{scope}.dense_in"));
        params.extend(self.dense_out.named_parameters(&format!("{scope}.dense_out")));
        params
    }
}
