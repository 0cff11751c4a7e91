//! Scaled dot-product attention primitives for the transformer project.
//!
//! The crate defines a portable API for computing attention over tensors with
//! layout `[batch, n_heads, seq_len, head_dim]`. The inputs `Q`, `K`, and `V`
//! share the same layout and dtype (bf16, f16, or f32). Reductions are
//! performed internally in `f32`, and the output tensor matches the input
//! dtype with the query-side sequence length.
//!
//! Masks are binary tensors (`1.0` = attend, `0.0` = ignore) broadcastable to
//! the score shape `[batch, n_heads, q_len, k_len]`. Masked scores are filled
//! with a large finite negative constant rather than `-inf`, so rows that are
//! masked in their entirety still softmax to finite weights.
//!
//! Dropout is an optional, train-only concern controlled via the public
//! configuration. Callers should disable it for evaluation or when
//! deterministic outputs are required.

pub mod core;
pub mod kernel;
pub mod masks;

pub use crate::core::{Attention, AttentionError, Config};
pub use kernel::ScaledDotProduct;
