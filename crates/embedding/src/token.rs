//! Learned token embedding table.

use candle_core::{DType, Device, Error, Result, Tensor, Var};
use layers::checks;

/// Maps `(batch, seq)` token ids to `(batch, seq, embedding_dim)` rows.
pub struct TokenEmbedding {
    vocab_size: usize,
    embedding_dim: usize,
    weight: Var,
}

impl TokenEmbedding {
    /// Builds a table with rows drawn from a unit Gaussian.
    pub fn with_init(
        vocab_size: usize,
        embedding_dim: usize,
        dtype: DType,
        device: &Device,
    ) -> Result<Self> {
        if vocab_size == 0 {
            return Err(Error::Msg("embedding vocab_size must be positive".to_string()));
        }
        if embedding_dim == 0 {
            return Err(Error::Msg(
                "embedding embedding_dim must be positive".to_string(),
            ));
        }
        let weight = Tensor::randn(0f32, 1.0, (vocab_size, embedding_dim), device)?
            .to_dtype(dtype)?;
        Self::from_parameters(vocab_size, embedding_dim, weight)
    }

    /// Wraps an explicit table, validating its shape.
    pub fn from_parameters(
        vocab_size: usize,
        embedding_dim: usize,
        weight: Tensor,
    ) -> Result<Self> {
        checks::expect_shape("embedding weight", &weight, &[vocab_size, embedding_dim])?;
        checks::expect_dtype_in(
            "embedding weight",
            &weight,
            &[DType::F16, DType::BF16, DType::F32],
        )?;
        Ok(Self {
            vocab_size,
            embedding_dim,
            weight: Var::from_tensor(&weight)?,
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn weight(&self) -> &Var {
        &self.weight
    }

    /// Looks up embedding rows for a `(batch, seq)` id tensor.
    ///
    /// Ids must be integers in `[0, vocab_size)`; out-of-range ids are
    /// reported as errors rather than clamped.
    pub fn forward(&self, token_ids: &Tensor) -> Result<Tensor> {
        checks::expect_rank("embedding ids", token_ids, 2)?;
        checks::expect_dtype_in(
            "embedding ids",
            token_ids,
            &[DType::U8, DType::U32, DType::I64],
        )?;
        let (batch, seq) = token_ids.dims2()?;

        let ids = token_ids.to_dtype(DType::I64)?;
        let max_id = ids.max_all()?.to_scalar::<i64>()?;
        let min_id = ids.min_all()?.to_scalar::<i64>()?;
        if min_id < 0 || max_id >= self.vocab_size as i64 {
            return Err(Error::Msg(format!(
                "token id out of range: ids span [{min_id}, {max_id}], vocab_size is {}",
                self.vocab_size
            )));
        }

        let flat = ids.flatten_all()?.to_dtype(DType::U32)?;
        let rows = self.weight.as_tensor().index_select(&flat, 0)?;
        rows.reshape((batch, seq, self.embedding_dim))
    }

    /// Exposes trainable parameters with dotted names under `scope`.
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        vec![(format!("{scope}.weight"), self.weight.clone())]
    }
}
