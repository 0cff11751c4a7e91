//! Core traits and types shared across attention implementations.
//!
//! Implementations are expected to operate on tensors with layout
//! `[batch, n_heads, seq_len, head_dim]`. The output tensor mirrors the input
//! layout, and reductions should accumulate in `f32` regardless of the
//! incoming dtype (`bf16`, `f16`, or `f32`).

pub mod config;
pub mod errors;

use candle_core::Tensor;

pub use config::Config;
pub use errors::AttentionError;

/// Unified interface for attention kernels.
///
/// * `q` is shaped `[batch, n_heads, q_len, head_dim]`; `k` and `v` share
///   `[batch, n_heads, k_len, head_dim]`.
/// * The returned tensor has shape `[batch, n_heads, q_len, head_dim]` and
///   the dtype of `q`.
/// * Masks, when present, are binary (`1` = attend, `0` = ignore) and must be
///   broadcastable to `[batch, n_heads, q_len, k_len]`.
/// * Reductions are performed in `f32`; other dtypes are converted as needed.
/// * Dropout is controlled via [`Config::dropout_p`] and is only meaningful
///   during training; callers pass `None` for deterministic evaluation.
pub trait Attention {
    /// Compute attention with an optional binary mask.
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
        config: &Config,
    ) -> Result<Tensor, AttentionError>;
}
