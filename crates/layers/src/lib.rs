//! Building blocks for transformer layers.
//!
//! This crate hosts the dense projections, layer normalisation, feed-forward
//! stacks, and the multi-head attention wrapper assembled from the attention
//! kernel and Candle primitives. Hidden states follow the
//! `(batch, seq, hidden)` convention throughout.

pub mod activations;
pub mod checks;
pub mod dtypes;
pub mod linear;
pub mod mlp;
pub mod mode;
pub mod multi_head;
pub mod norm;

pub use dtypes::PrecisionPolicy;
pub use linear::{Linear, LinearConfig, LinearInit};
pub use mlp::{FeedForward, FeedForwardConfig};
pub use mode::Mode;
pub use multi_head::{MultiHeadAttention, MultiHeadConfig};
pub use norm::{LayerNorm, NormConfig};
