//! Multi-head attention built on the scaled dot-product kernel.
//!
//! Four dense projections surround the kernel: separate query, key, and value
//! maps plus an output projection. Projected activations are reshaped to
//! `(batch, heads, seq, head_dim)` before attention and merged back
//! afterwards. Masks arrive in the rank-3 `(batch, q_len, k_len)` layout and
//! are broadcast over the head axis here.

use std::sync::OnceLock;

use attention::{Attention, Config as KernelConfig, ScaledDotProduct};
use candle_core::{DType, Device, Error, Result, Tensor, Var};

use crate::checks;
use crate::dtypes::PrecisionPolicy;
use crate::linear::{Linear, LinearConfig, LinearInit};
use crate::mode::Mode;

/// Head layout and dropout for a multi-head attention block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiHeadConfig {
    pub embedding_dim: usize,
    pub head_count: usize,
    pub dropout_p: Option<f32>,
}

impl MultiHeadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            return Err(Error::Msg(
                "attention embedding_dim must be positive".to_string(),
            ));
        }
        if self.head_count == 0 {
            return Err(Error::Msg(
                "attention head_count must be positive".to_string(),
            ));
        }
        if self.embedding_dim % self.head_count != 0 {
            return Err(Error::Msg(format!(
                "embedding_dim {} is not divisible by head_count {}",
                self.embedding_dim, self.head_count
            )));
        }
        if let Some(p) = self.dropout_p {
            if !(0.0..1.0).contains(&p) {
                return Err(Error::Msg(format!(
                    "attention dropout_p must lie in [0, 1), got {p}"
                )));
            }
        }
        Ok(())
    }

    pub fn head_dim(&self) -> usize {
        self.embedding_dim / self.head_count
    }
}

/// Projects, attends per head, and recombines.
pub struct MultiHeadAttention {
    config: MultiHeadConfig,
    query: Linear,
    key: Linear,
    value: Linear,
    output: Linear,
    kernel: ScaledDotProduct,
    first_call: OnceLock<()>,
}

impl MultiHeadAttention {
    pub fn with_init(config: MultiHeadConfig, dtype: DType, device: &Device) -> Result<Self> {
        config.validate()?;
        let projection = LinearConfig {
            input_dim: config.embedding_dim,
            output_dim: config.embedding_dim,
            bias: true,
        };
        let build = || Linear::with_init(projection, LinearInit::XavierUniform, dtype, device);
        Ok(Self {
            config,
            query: build()?,
            key: build()?,
            value: build()?,
            output: build()?,
            kernel: ScaledDotProduct::new(),
            first_call: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &MultiHeadConfig {
        &self.config
    }

    /// Runs attention with `query` attending over `key`/`value`.
    ///
    /// For self-attention all three arguments are the same tensor; for
    /// cross-attention `key` and `value` come from the encoder while `query`
    /// carries the decoder state. An optional `(batch, q_len, k_len)` mask
    /// selects which positions each query may attend to.
    pub fn forward(
        &self,
        query: &Tensor,
        key: &Tensor,
        value: &Tensor,
        mask: Option<&Tensor>,
        policy: &PrecisionPolicy,
        mode: Mode,
    ) -> Result<Tensor> {
        self.first_call.get_or_init(|| {
            log::info!(
                "multi-head attention active: heads={} head_dim={}",
                self.config.head_count,
                self.config.head_dim()
            );
        });
        checks::expect_batch_seq_hidden("attention query", query, self.config.embedding_dim)?;
        checks::expect_batch_seq_hidden("attention key", key, self.config.embedding_dim)?;
        checks::expect_batch_seq_hidden("attention value", value, self.config.embedding_dim)?;

        let (batch, q_len, _) = query.dims3()?;
        let (k_batch, k_len, _) = key.dims3()?;
        let (v_batch, v_len, _) = value.dims3()?;
        if batch != k_batch || batch != v_batch {
            return Err(Error::Msg(format!(
                "attention batch sizes disagree: query {batch}, key {k_batch}, value {v_batch}"
            )));
        }
        if k_len != v_len {
            return Err(Error::Msg(format!(
                "attention key/value lengths disagree: key {k_len}, value {v_len}"
            )));
        }

        let q_heads = self.split_heads(&self.query.forward(query, policy)?)?;
        let k_heads = self.split_heads(&self.key.forward(key, policy)?)?;
        let v_heads = self.split_heads(&self.value.forward(value, policy)?)?;

        let broadcast_mask = match mask {
            None => None,
            Some(mask) => Some(self.broadcast_mask(mask, batch, q_len, k_len)?),
        };

        let kernel_config = KernelConfig {
            dropout_p: if mode.is_training() {
                self.config.dropout_p
            } else {
                None
            },
        };
        let attended = self
            .kernel
            .attend(
                &q_heads,
                &k_heads,
                &v_heads,
                broadcast_mask.as_ref(),
                &kernel_config,
            )
            .map_err(|e| Error::Msg(e.to_string()))?;

        let merged = attended
            .permute((0, 2, 1, 3))?
            .contiguous()?
            .reshape((batch, q_len, self.config.embedding_dim))?;
        self.output.forward(&merged, policy)
    }

    /// Exposes trainable parameters with dotted names under `scope`.
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self.query.named_parameters(&format!("{scope}.query"));
        params.extend(self.key.named_parameters(&format!("{scope}.key")));
        params.extend(self.value.named_parameters(&format!("{scope}.value")));
        params.extend(self.output.named_parameters(&format!("{scope}.output")));
        params
    }

    fn split_heads(&self, projected: &Tensor) -> Result<Tensor> {
        let (batch, seq, _) = projected.dims3()?;
        projected
            .reshape((batch, seq, self.config.head_count, self.config.head_dim()))?
            .permute((0, 2, 1, 3))?
            .contiguous()
    }

    fn broadcast_mask(
        &self,
        mask: &Tensor,
        batch: usize,
        q_len: usize,
        k_len: usize,
    ) -> Result<Tensor> {
        let dims = mask.dims();
        match dims {
            [mask_batch, mask_q, mask_k] => {
                let batch_ok = *mask_batch == batch || *mask_batch == 1;
                let q_ok = *mask_q == q_len || *mask_q == 1;
                if !batch_ok || !q_ok || *mask_k != k_len {
                    return Err(Error::Msg(format!(
                        "attention mask shape {dims:?} does not cover (batch={batch}, q_len={q_len}, k_len={k_len})"
                    )));
                }
                // Insert the head axis; the kernel broadcasts over it.
                mask.unsqueeze(1)
            }
            _ => Err(Error::Msg(format!(
                "attention mask must have rank 3, got {dims:?}"
            ))),
        }
    }
}
