//! Layer normalisation over the hidden axis.
//!
//! Statistics are computed per position in the reduction dtype. The variance
//! estimate is unbiased (divides by `hidden_size - 1`) and the normaliser is
//! `std + epsilon`, applied to the standard deviation rather than the
//! variance. Learnable scale and shift vectors are stored as [`Var`]s.

use candle_core::{DType, Device, Error, Result, Tensor, Var, D};

use crate::checks;
use crate::dtypes::PrecisionPolicy;

pub const DEFAULT_EPSILON: f64 = 1e-6;

/// Hidden width and numerical fudge factor for a normalisation layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormConfig {
    pub hidden_size: usize,
    pub epsilon: f64,
}

impl NormConfig {
    pub fn new(hidden_size: usize) -> Self {
        Self {
            hidden_size,
            epsilon: DEFAULT_EPSILON,
        }
    }

    pub fn validate(&self) -> Result<()> {
        // The unbiased variance divides by hidden_size - 1.
        if self.hidden_size < 2 {
            return Err(Error::Msg(format!(
                "layer norm hidden_size must be at least 2, got {}",
                self.hidden_size
            )));
        }
        if !(self.epsilon > 0.0) {
            return Err(Error::Msg(format!(
                "layer norm epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}

/// Learnable normalisation over the last axis of `(batch, seq, hidden)`.
pub struct LayerNorm {
    config: NormConfig,
    gamma: Var,
    beta: Var,
}

impl LayerNorm {
    /// Builds a layer with identity parameters (`gamma = 1`, `beta = 0`).
    pub fn with_init(config: NormConfig, dtype: DType, device: &Device) -> Result<Self> {
        config.validate()?;
        let gamma = Tensor::ones(config.hidden_size, dtype, device)?;
        let beta = Tensor::zeros(config.hidden_size, dtype, device)?;
        Self::from_parameters(config, gamma, beta)
    }

    /// Wraps explicit scale and shift vectors.
    pub fn from_parameters(config: NormConfig, gamma: Tensor, beta: Tensor) -> Result<Self> {
        config.validate()?;
        checks::expect_shape("layer norm gamma", &gamma, &[config.hidden_size])?;
        checks::expect_shape("layer norm beta", &beta, &[config.hidden_size])?;
        if gamma.dtype() != beta.dtype() {
            return Err(Error::Msg(format!(
                "layer norm gamma dtype {:?} does not match beta dtype {:?}",
                gamma.dtype(),
                beta.dtype()
            )));
        }
        Ok(Self {
            config,
            gamma: Var::from_tensor(&gamma)?,
            beta: Var::from_tensor(&beta)?,
        })
    }

    pub fn config(&self) -> &NormConfig {
        &self.config
    }

    /// Normalises each position independently across the hidden axis.
    pub fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        checks::expect_batch_seq_hidden("layer norm input", hidden, self.config.hidden_size)?;
        let n = self.config.hidden_size as f64;
        let compute = policy.cast_for_reduction(hidden)?;

        let mean = (compute.sum_keepdim(D::Minus1)? / n)?;
        let centered = compute.broadcast_sub(&mean)?;
        let variance = (centered.sqr()?.sum_keepdim(D::Minus1)? / (n - 1.0))?;
        let denom = variance.sqrt()?.affine(1.0, self.config.epsilon)?;
        let normalized = centered.broadcast_div(&denom)?;

        let gamma = policy.cast_for_reduction(self.gamma.as_tensor())?;
        let beta = policy.cast_for_reduction(self.beta.as_tensor())?;
        let scaled = normalized.broadcast_mul(&gamma)?.broadcast_add(&beta)?;
        policy.cast_to_storage(&scaled)
    }

    /// Exposes trainable parameters with dotted names under `scope`.
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        vec![
            (format!("{scope}.gamma"), self.gamma.clone()),
            (format!("{scope}.beta"), self.beta.clone()),
        ]
    }
}
