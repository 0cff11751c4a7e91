//! Trainable dense projections.
//!
//! Weights are stored as `(output_dim, input_dim)` matrices wrapped in
//! [`Var`] so optimizers and checkpoints can address them by name. Forward
//! passes accept `(rows, input_dim)` or `(batch, seq, input_dim)` activations
//! and return outputs in the caller's storage dtype.

use candle_core::{DType, Device, Error, Result, Tensor, Var};

use crate::checks;
use crate::dtypes::PrecisionPolicy;

/// Shape and bias selection for a dense projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearConfig {
    pub input_dim: usize,
    pub output_dim: usize,
    pub bias: bool,
}

impl LinearConfig {
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 {
            return Err(Error::Msg("linear input_dim must be positive".to_string()));
        }
        if self.output_dim == 0 {
            return Err(Error::Msg("linear output_dim must be positive".to_string()));
        }
        Ok(())
    }
}

/// Weight initialisation schemes for dense projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearInit {
    /// Uniform on `[-sqrt(6 / (fan_in + fan_out)), +sqrt(6 / (fan_in + fan_out))]`.
    XavierUniform,
    /// Gaussian with standard deviation `sqrt(2 / (fan_in + fan_out))`.
    XavierNormal,
}

impl LinearInit {
    fn sample_weight(self, config: &LinearConfig, dtype: DType, device: &Device) -> Result<Tensor> {
        let fan_sum = (config.input_dim + config.output_dim) as f32;
        let shape = (config.output_dim, config.input_dim);
        let weight = match self {
            LinearInit::XavierUniform => {
                let limit = (6.0 / fan_sum).sqrt();
                Tensor::rand(-limit, limit, shape, device)?
            }
            LinearInit::XavierNormal => {
                let std = (2.0 / fan_sum).sqrt();
                Tensor::randn(0f32, std, shape, device)?
            }
        };
        weight.to_dtype(dtype)
    }
}

/// A fully connected layer with optional bias.
pub struct Linear {
    config: LinearConfig,
    weight: Var,
    bias: Option<Var>,
}

impl Linear {
    /// Wraps explicit parameter tensors, validating their shapes and dtypes.
    pub fn new(config: LinearConfig, weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        config.validate()?;
        checks::expect_shape(
            "linear weight",
            &weight,
            &[config.output_dim, config.input_dim],
        )?;
        checks::expect_dtype_in(
            "linear weight",
            &weight,
            &[DType::F16, DType::BF16, DType::F32],
        )?;
        if config.bias != bias.is_some() {
            return Err(Error::Msg(
                "linear bias presence does not match config".to_string(),
            ));
        }
        let bias = match bias {
            Some(bias) => {
                checks::expect_shape("linear bias", &bias, &[config.output_dim])?;
                if bias.dtype() != weight.dtype() {
                    return Err(Error::Msg(format!(
                        "linear bias dtype {:?} does not match weight dtype {:?}",
                        bias.dtype(),
                        weight.dtype()
                    )));
                }
                Some(Var::from_tensor(&bias)?)
            }
            None => None,
        };
        Ok(Self {
            config,
            weight: Var::from_tensor(&weight)?,
            bias,
        })
    }

    /// Builds a layer with freshly sampled parameters.
    pub fn with_init(
        config: LinearConfig,
        init: LinearInit,
        dtype: DType,
        device: &Device,
    ) -> Result<Self> {
        config.validate()?;
        let weight = init.sample_weight(&config, dtype, device)?;
        let bias = if config.bias {
            Some(Tensor::zeros(config.output_dim, dtype, device)?)
        } else {
            None
        };
        Self::new(config, weight, bias)
    }

    pub fn config(&self) -> &LinearConfig {
        &self.config
    }

    pub fn weight(&self) -> &Var {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Var> {
        self.bias.as_ref()
    }

    /// Applies `input @ weight^T + bias`.
    ///
    /// Accepts rank-2 `(rows, input_dim)` or rank-3 `(batch, seq, input_dim)`
    /// activations and preserves the leading dimensions.
    pub fn forward(&self, input: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        let dims = input.dims().to_vec();
        let flat = match dims.as_slice() {
            [_, input_dim] => {
                self.expect_input_dim(*input_dim)?;
                input.clone()
            }
            [batch, seq, input_dim] => {
                self.expect_input_dim(*input_dim)?;
                input.reshape((batch * seq, *input_dim))?
            }
            _ => {
                return Err(Error::Msg(format!(
                    "linear input must have rank 2 or 3, got {dims:?}"
                )))
            }
        };

        let flat = policy.cast_for_matmul(&flat)?.contiguous()?;
        let weight = policy.cast_for_matmul(self.weight.as_tensor())?;
        let mut output = flat.matmul(&weight.t()?)?;
        if let Some(bias) = &self.bias {
            let bias = policy.cast_for_matmul(bias.as_tensor())?;
            output = output.broadcast_add(&bias)?;
        }
        let output = policy.cast_to_storage(&output)?;

        match dims.as_slice() {
            [_, _] => Ok(output),
            [batch, seq, _] => output.reshape((*batch, *seq, self.config.output_dim)),
            _ => unreachable!("rank validated above"),
        }
    }

    /// Exposes trainable parameters with dotted names under `scope`.
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = vec![(format!("{scope}.weight"), self.weight.clone())];
        if let Some(bias) = &self.bias {
            params.push((format!("{scope}.bias"), bias.clone()));
        }
        params
    }

    fn expect_input_dim(&self, actual: usize) -> Result<()> {
        if actual == self.config.input_dim {
            Ok(())
        } else {
            Err(Error::Msg(format!(
                "linear expected input_dim {}, got {actual}",
                self.config.input_dim
            )))
        }
    }
}
