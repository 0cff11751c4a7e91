//! Reference CPU-friendly scaled dot-product attention kernel.
//!
//! The kernel prioritises numerical fidelity and mirrors the semantics
//! described by the [`Attention`](crate::core::Attention) trait: scores are
//! scaled by `1/sqrt(head_dim)`, masked positions are filled with
//! [`MASKED_SCORE_FILL`], softmax runs over the key axis, and the weighted sum
//! over values produces the output.

use std::sync::OnceLock;

use candle_core::{DType, Tensor};
use candle_nn::ops::{dropout, softmax_last_dim};

use crate::core::{Attention, AttentionError, Config};
use crate::masks::MASK_DTYPE;

/// Finite fill value for masked attention scores.
///
/// Deliberately not `-inf`: a row whose every key is masked still softmaxes to
/// finite (uniform) weights instead of propagating NaN through the stack.
pub const MASKED_SCORE_FILL: f32 = -1e10;

/// Numerically stable, portable scaled dot-product attention kernel.
#[derive(Debug, Default)]
pub struct ScaledDotProduct {
    first_call: OnceLock<()>,
}

impl ScaledDotProduct {
    /// Construct the reference kernel.
    pub fn new() -> Self {
        Self {
            first_call: OnceLock::new(),
        }
    }
}

impl Attention for ScaledDotProduct {
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
        config: &Config,
    ) -> Result<Tensor, AttentionError> {
        if self.first_call.set(()).is_ok() {
            log::info!(
                "attention::kernel init masked_fill={MASKED_SCORE_FILL} dropout_p={:?}",
                config.dropout_p
            );
        }

        let device = q.device();
        if !device.same_device(k.device()) || !device.same_device(v.device()) {
            return Err(AttentionError::InvalidShape {
                context: "q, k, v must reside on the same device".to_string(),
            });
        }

        let dtype = q.dtype();
        if dtype != k.dtype() || dtype != v.dtype() {
            return Err(AttentionError::InvalidShape {
                context: "q, k, v must share the same dtype".to_string(),
            });
        }
        if !matches!(dtype, DType::F32 | DType::F16 | DType::BF16) {
            return Err(AttentionError::UnsupportedDType {
                requested: format!("{dtype:?}"),
            });
        }
        if !q.is_contiguous() || !k.is_contiguous() || !v.is_contiguous() {
            return Err(AttentionError::InvalidShape {
                context: "q, k, v must be contiguous in memory".to_string(),
            });
        }

        let (batch, heads, q_len, head_dim) =
            q.dims4().map_err(|_| AttentionError::InvalidShape {
                context: "q must have shape [batch, heads, seq_len, head_dim]".to_string(),
            })?;
        let (kb, kh, k_len, kd) = k.dims4().map_err(|_| AttentionError::InvalidShape {
            context: "k must have shape [batch, heads, seq_len, head_dim]".to_string(),
        })?;
        let (vb, vh, vk, vd) = v.dims4().map_err(|_| AttentionError::InvalidShape {
            context: "v must have shape [batch, heads, seq_len, head_dim]".to_string(),
        })?;

        if kb != batch || kh != heads || kd != head_dim {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "k shape mismatch: expected [{batch}, {heads}, ?, {head_dim}] got [{kb}, {kh}, {k_len}, {kd}]"
                ),
            });
        }
        if vb != batch || vh != heads || vk != k_len || vd != head_dim {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "v shape mismatch: expected [{batch}, {heads}, {k_len}, {head_dim}] got [{vb}, {vh}, {vk}, {vd}]"
                ),
            });
        }

        // Reductions accumulate in f32 regardless of the storage dtype.
        let (q_work, k_work, v_work) = if dtype == DType::F32 {
            (q.clone(), k.clone(), v.clone())
        } else {
            (
                q.to_dtype(DType::F32)?,
                k.to_dtype(DType::F32)?,
                v.to_dtype(DType::F32)?,
            )
        };

        let merged = batch * heads;
        let q_view = q_work.reshape((merged, q_len, head_dim))?;
        let k_view = k_work.reshape((merged, k_len, head_dim))?;
        let k_t = k_view.transpose(1, 2)?;
        let scale = 1.0 / (head_dim as f64).sqrt();
        let scores = q_view.matmul(&k_t)?.affine(scale, 0.0)?;
        let mut scores = scores.reshape((batch, heads, q_len, k_len))?;

        if let Some(mask) = mask {
            if !device.same_device(mask.device()) {
                return Err(AttentionError::InvalidShape {
                    context: "mask must reside on the same device as q".to_string(),
                });
            }
            if mask.dtype() != MASK_DTYPE {
                return Err(AttentionError::UnsupportedDType {
                    requested: format!("mask expects dtype {MASK_DTYPE:?}, got {:?}", mask.dtype()),
                });
            }
            let (mb, mh, mq, mk) = mask.dims4().map_err(|_| AttentionError::InvalidShape {
                context: "mask must have shape [batch|1, heads|1, q_len|1, k_len]".to_string(),
            })?;
            let broadcastable = (mb == batch || mb == 1)
                && (mh == heads || mh == 1)
                && (mq == q_len || mq == 1)
                && mk == k_len;
            if !broadcastable {
                return Err(AttentionError::InvalidShape {
                    context: format!(
                        "mask shape mismatch: [{mb}, {mh}, {mq}, {mk}] does not broadcast to [{batch}, {heads}, {q_len}, {k_len}]"
                    ),
                });
            }
            let keep = mask.broadcast_as((batch, heads, q_len, k_len))?;
            // score * keep + (1 - keep) * fill == masked_fill(score, keep == 0, fill)
            let penalty = keep
                .affine(-1.0, 1.0)?
                .affine(f64::from(MASKED_SCORE_FILL), 0.0)?;
            scores = scores.mul(&keep)?.add(&penalty)?;
        }

        let weights = softmax_last_dim(&scores)?;

        let weights = match config.dropout_p {
            Some(p) if !(0.0..1.0).contains(&p) => {
                return Err(AttentionError::InvalidShape {
                    context: format!("dropout probability must be in [0, 1), got {p}"),
                });
            }
            Some(p) if p > 0.0 => dropout(&weights, p)?,
            _ => weights,
        };

        let weights_view = weights.reshape((merged, q_len, k_len))?;
        let v_view = v_work.reshape((merged, k_len, head_dim))?;
        let output = weights_view.matmul(&v_view)?;
        let output = output.reshape((batch, heads, q_len, head_dim))?;

        Ok(output.to_dtype(dtype)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masks::causal_mask;
    use candle_core::{DType, Device, Result as CandleResult, Tensor};

    fn build_inputs(device: &Device) -> CandleResult<(Tensor, Tensor, Tensor)> {
        let data: Vec<f32> = (0..64).map(|i| (i as f32) * 0.01).collect();
        let q = Tensor::from_vec(data.clone(), (1, 2, 4, 8), device)?;
        let k = Tensor::from_vec(data.clone(), (1, 2, 4, 8), device)?;
        let v = Tensor::from_vec(data, (1, 2, 4, 8), device)?;
        Ok((q, k, v))
    }

    fn causal_mask_4d(device: &Device, seq_len: usize) -> CandleResult<Tensor> {
        causal_mask(device, seq_len)?.reshape((1, 1, seq_len, seq_len))
    }

    fn naive_attention(
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
    ) -> CandleResult<Tensor> {
        let (batch, heads, q_len, head_dim) = q.dims4()?;
        let (_, _, k_len, _) = k.dims4()?;
        let mut output = vec![0f32; batch * heads * q_len * head_dim];

        let q_vec = q.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        let k_vec = k.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        let v_vec = v.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        let mask_vec = if let Some(m) = mask {
            Some(
                m.broadcast_as((batch, heads, q_len, k_len))?
                    .contiguous()?
                    .flatten_all()?
                    .to_vec1::<f32>()?,
            )
        } else {
            None
        };
        let scale = 1.0 / (head_dim as f32).sqrt();

        for b in 0..batch {
            for h in 0..heads {
                for q_idx in 0..q_len {
                    let mut row = vec![0f32; k_len];
                    let mut max_val = f32::NEG_INFINITY;
                    for k_idx in 0..k_len {
                        let mut dot = 0f32;
                        for d in 0..head_dim {
                            let qi = ((b * heads + h) * q_len + q_idx) * head_dim + d;
                            let ki = ((b * heads + h) * k_len + k_idx) * head_dim + d;
                            dot += q_vec[qi] * k_vec[ki];
                        }
                        dot *= scale;
                        if let Some(mask_vec) = &mask_vec {
                            let mi = ((b * heads + h) * q_len + q_idx) * k_len + k_idx;
                            if mask_vec[mi] == 0.0 {
                                dot = MASKED_SCORE_FILL;
                            }
                        }
                        row[k_idx] = dot;
                        if dot > max_val {
                            max_val = dot;
                        }
                    }
                    let mut denom = 0f32;
                    for val in row.iter_mut() {
                        *val = (*val - max_val).exp();
                        denom += *val;
                    }
                    for d in 0..head_dim {
                        let mut acc = 0f32;
                        for k_idx in 0..k_len {
                            let weight = row[k_idx] / denom;
                            let vi = ((b * heads + h) * k_len + k_idx) * head_dim + d;
                            acc += weight * v_vec[vi];
                        }
                        let oi = ((b * heads + h) * q_len + q_idx) * head_dim + d;
                        output[oi] = acc;
                    }
                }
            }
        }

        Tensor::from_vec(output, (batch, heads, q_len, head_dim), q.device())
    }

    #[test]
    fn kernel_matches_naive() -> CandleResult<()> {
        let device = Device::Cpu;
        let (q, k, v) = build_inputs(&device)?;
        let mask = causal_mask_4d(&device, 4)?;
        let kernel = ScaledDotProduct::new();
        let output = kernel
            .attend(&q, &k, &v, Some(&mask), &Config::default())
            .unwrap();
        let expected = naive_attention(&q, &k, &v, Some(&mask))?;
        let diff = output.sub(&expected)?.abs()?.max_all()?.to_vec0::<f32>()?;
        assert!(diff < 1e-5);
        Ok(())
    }

    #[test]
    fn output_shape_matches_value_shape() -> CandleResult<()> {
        let device = Device::Cpu;
        let (q, k, v) = build_inputs(&device)?;
        let kernel = ScaledDotProduct::new();

        let unmasked = kernel.attend(&q, &k, &v, None, &Config::default()).unwrap();
        assert_eq!(unmasked.dims(), v.dims());

        let mask = causal_mask_4d(&device, 4)?;
        let masked = kernel
            .attend(&q, &k, &v, Some(&mask), &Config::default())
            .unwrap();
        assert_eq!(masked.dims(), v.dims());
        Ok(())
    }

    #[test]
    fn softmax_rows_sum_to_one_and_masked_weight_is_negligible() -> CandleResult<()> {
        let device = Device::Cpu;
        let seq = 4;
        let data: Vec<f32> = (0..seq * seq).map(|i| (i as f32) * 0.1 - 0.5).collect();
        let q = Tensor::from_vec(data.clone(), (1, 1, seq, seq), &device)?;
        let k = Tensor::from_vec(data, (1, 1, seq, seq), &device)?;
        // With V = I the attention output rows are exactly the weight rows.
        let mut identity = vec![0f32; seq * seq];
        for i in 0..seq {
            identity[i * seq + i] = 1.0;
        }
        let v = Tensor::from_vec(identity, (1, 1, seq, seq), &device)?;
        let mask = causal_mask_4d(&device, seq)?;

        let kernel = ScaledDotProduct::new();
        let weights = kernel
            .attend(&q, &k, &v, Some(&mask), &Config::default())
            .unwrap();
        let rows = weights.reshape((seq, seq))?.to_vec2::<f32>()?;
        for (q_idx, row) in rows.iter().enumerate() {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "row {q_idx} sums to {sum}");
            for (k_idx, &weight) in row.iter().enumerate() {
                if k_idx > q_idx {
                    assert!(
                        weight <= 1e-6,
                        "masked weight at ({q_idx}, {k_idx}) is {weight}"
                    );
                }
            }
        }
        Ok(())
    }

    #[test]
    fn fully_masked_row_stays_finite() -> CandleResult<()> {
        let device = Device::Cpu;
        let (q, k, v) = build_inputs(&device)?;
        let mask = Tensor::zeros((1, 1, 4, 4), MASK_DTYPE, &device)?;
        let kernel = ScaledDotProduct::new();
        let output = kernel
            .attend(&q, &k, &v, Some(&mask), &Config::default())
            .unwrap();
        let values = output.flatten_all()?.to_vec1::<f32>()?;
        assert!(values.iter().all(|value| value.is_finite()));
        Ok(())
    }

    #[test]
    fn mismatched_shapes_error() {
        let device = Device::Cpu;
        let q = Tensor::zeros((1, 2, 4, 8), DType::F32, &device).unwrap();
        let k = Tensor::zeros((1, 2, 5, 8), DType::F32, &device).unwrap();
        let v = Tensor::zeros((1, 2, 4, 8), DType::F32, &device).unwrap();
        let kernel = ScaledDotProduct::new();
        let err = kernel
            .attend(&q, &k, &v, None, &Config::default())
            .unwrap_err();
        assert!(matches!(err, AttentionError::InvalidShape { .. }));
    }

    #[test]
    fn mask_shape_validation() {
        let device = Device::Cpu;
        let q = Tensor::zeros((1, 2, 4, 8), DType::F32, &device).unwrap();
        let k = Tensor::zeros((1, 2, 4, 8), DType::F32, &device).unwrap();
        let v = Tensor::zeros((1, 2, 4, 8), DType::F32, &device).unwrap();
        let mask = Tensor::zeros((1, 1, 4, 5), MASK_DTYPE, &device).unwrap();
        let kernel = ScaledDotProduct::new();
        let err = kernel
            .attend(&q, &k, &v, Some(&mask), &Config::default())
            .unwrap_err();
        assert!(matches!(err, AttentionError::InvalidShape { .. }));
    }

    #[test]
    fn mask_dtype_validation() {
        let device = Device::Cpu;
        let q = Tensor::zeros((1, 1, 4, 8), DType::F32, &device).unwrap();
        let k = Tensor::zeros((1, 1, 4, 8), DType::F32, &device).unwrap();
        let v = Tensor::zeros((1, 1, 4, 8), DType::F32, &device).unwrap();
        let mask = Tensor::zeros((1, 1, 4, 4), DType::U8, &device).unwrap();
        let kernel = ScaledDotProduct::new();
        let err = kernel
            .attend(&q, &k, &v, Some(&mask), &Config::default())
            .unwrap_err();
        assert!(matches!(err, AttentionError::UnsupportedDType { .. }));
    }

    #[test]
    fn numerical_stability() {
        let device = Device::Cpu;
        let q = Tensor::full(10_000.0f32, (1, 1, 4, 4), &device).unwrap();
        let k = Tensor::full(-10_000.0f32, (1, 1, 4, 4), &device).unwrap();
        let v = Tensor::ones((1, 1, 4, 4), DType::F32, &device).unwrap();
        let kernel = ScaledDotProduct::new();
        let out = kernel
            .attend(&q, &k, &v, None, &Config::default())
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert!(out.iter().all(|value| value.is_finite()));
    }

    #[test]
    fn dropout_zero_probability_is_noop() -> CandleResult<()> {
        let device = Device::Cpu;
        let (q, k, v) = build_inputs(&device)?;
        let mask = causal_mask_4d(&device, 4)?;
        let config = Config {
            dropout_p: Some(0.0),
        };
        let kernel = ScaledDotProduct::new();
        let out = kernel.attend(&q, &k, &v, Some(&mask), &config).unwrap();
        let reference = kernel
            .attend(&q, &k, &v, Some(&mask), &Config::default())
            .unwrap();
        let diff = out.sub(&reference)?.abs()?.max_all()?.to_vec0::<f32>()?;
        assert!(diff < 1e-6);
        Ok(())
    }

    #[test]
    fn invalid_dropout_probability_errors() {
        let device = Device::Cpu;
        let q = Tensor::zeros((1, 1, 2, 4), DType::F32, &device).unwrap();
        let config = Config {
            dropout_p: Some(1.5),
        };
        let kernel = ScaledDotProduct::new();
        let err = kernel.attend(&q, &q, &q, None, &config).unwrap_err();
        assert!(matches!(err, AttentionError::InvalidShape { .. }));
    }
}
