//! Builders for padding masks derived from token id tensors.
//!
//! All padding masks share the dtype described in
//! [`super::MASK_DTYPE`](super::MASK_DTYPE). Token id inputs are shaped
//! `(batch, seq_len)` with any integer dtype.

use candle_core::{DType, Result, Tensor};

/// Construct the source padding mask, shaped `(batch, 1, seq_len)`.
///
/// Positions holding `pad_token` receive `0.0` (ignored as attention keys);
/// every other position receives `1.0`.
pub fn source_padding_mask(token_ids: &Tensor, pad_token: u32) -> Result<Tensor> {
    let (batch, seq_len) = token_ids.dims2()?;
    let ids = token_ids.to_dtype(DType::I64)?.to_vec2::<i64>()?;
    let pad = i64::from(pad_token);

    let mut data = vec![0f32; batch * seq_len];
    for (b, row) in ids.iter().enumerate() {
        for (s, &id) in row.iter().enumerate() {
            if id != pad {
                data[b * seq_len + s] = 1.0;
            }
        }
    }
    Tensor::from_vec(data, (batch, 1, seq_len), token_ids.device())
}

/// Construct the combined causal + padding mask for target self-attention,
/// shaped `(batch, seq_len, seq_len)`.
///
/// A query at position `q` may attend to key position `k` only when `k <= q`
/// and the key token is not `pad_token`.
pub fn target_mask(token_ids: &Tensor, pad_token: u32) -> Result<Tensor> {
    let (batch, seq_len) = token_ids.dims2()?;
    let ids = token_ids.to_dtype(DType::I64)?.to_vec2::<i64>()?;
    let pad = i64::from(pad_token);

    let mut data = vec![0f32; batch * seq_len * seq_len];
    for (b, row) in ids.iter().enumerate() {
        for q in 0..seq_len {
            let row_start = (b * seq_len + q) * seq_len;
            for (k, &id) in row.iter().enumerate().take(q + 1) {
                if id != pad {
                    data[row_start + k] = 1.0;
                }
            }
        }
    }
    Tensor::from_vec(data, (batch, seq_len, seq_len), token_ids.device())
}
