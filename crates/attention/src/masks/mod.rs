//! Mask utilities shared by attention implementations.
//!
//! All masks produced here are binary tensors with dtype [`MASK_DTYPE`].
//! Entries are `1.0` where attention is permitted and `0.0` where it is
//! forbidden (padding exclusion, causal ordering). The kernel converts the
//! zeros into a large finite negative score before softmax.

pub mod causal;
pub mod padding;

use candle_core::DType;

/// Dtype shared by all binary masks.
pub const MASK_DTYPE: DType = DType::F32;

pub use causal::causal_mask;
pub use padding::{source_padding_mask, target_mask};

#[cfg(test)]
mod tests;
