//! Token and positional embeddings.
//!
//! [`TokenEmbedding`] maps integer token ids to dense rows of a learned
//! table. [`SinusoidalEncoding`] adds the fixed sine/cosine positional signal
//! on top of embedded tokens. Both operate on `(batch, seq)` id tensors and
//! `(batch, seq, embedding_dim)` activations.

pub mod positional;
pub mod token;

pub use positional::{SinusoidalConfig, SinusoidalEncoding};
pub use token::TokenEmbedding;
