//! Builder for causal attention masks.
//!
//! The resulting tensor has dtype [`MASK_DTYPE`](super::MASK_DTYPE) and shape
//! `[seq_len, seq_len]`. Entries are `1.0` where a query may attend to a key
//! (keys at or before the query position) and `0.0` otherwise.

use candle_core::{Device, Result, Tensor};

/// Construct a lower-triangular causal mask for the supplied sequence length.
pub fn causal_mask(device: &Device, seq_len: usize) -> Result<Tensor> {
    let mut data = vec![0f32; seq_len * seq_len];
    for q in 0..seq_len {
        for k in 0..=q {
            data[q * seq_len + k] = 1.0;
        }
    }
    Tensor::from_vec(data, (seq_len, seq_len), device)
}
