//! Encoder/decoder transformer assembly.
//!
//! Wires the embedding, attention, and layer crates into full encoder and
//! decoder stacks with a final vocabulary projection, plus checkpoint
//! save/load for the trainable parameters.

pub mod block;
pub mod checkpoint;
pub mod config;
pub mod model;

pub use attention::masks;
pub use checkpoint::{load_checkpoint, save_checkpoint, CHECKPOINT_VERSION};
pub use config::TransformerConfig;
pub use model::{Decoder, Encoder, Transformer};
