//! Fixed sinusoidal positional encoding.
//!
//! The table is precomputed once in `f64` for accuracy, then stored at the
//! model dtype. Row `pos` interleaves `sin(pos / 10000^(2i/d))` at even
//! columns with the matching cosine at odd columns. The table is a constant,
//! not a trainable parameter, and is never persisted in checkpoints.

use candle_core::{DType, Device, Error, Result, Tensor};
use layers::checks;

/// Table geometry and placement for a positional encoding.
#[derive(Debug, Clone)]
pub struct SinusoidalConfig {
    pub max_len: usize,
    pub embedding_dim: usize,
    pub dtype: DType,
    pub device: Device,
}

impl SinusoidalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_len == 0 {
            return Err(Error::Msg("positional max_len must be positive".to_string()));
        }
        if self.embedding_dim == 0 {
            return Err(Error::Msg(
                "positional embedding_dim must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Adds the deterministic positional signal to embedded tokens.
pub struct SinusoidalEncoding {
    config: SinusoidalConfig,
    table: Tensor,
}

impl SinusoidalEncoding {
    pub fn new(config: SinusoidalConfig) -> Result<Self> {
        config.validate()?;
        let max_len = config.max_len;
        let dim = config.embedding_dim;

        let mut data = vec![0f64; max_len * dim];
        let pairs = (dim + 1) / 2;
        for pos in 0..max_len {
            for pair in 0..pairs {
                let exponent = (2 * pair) as f64 / dim as f64;
                let angle = pos as f64 / 10_000f64.powf(exponent);
                data[pos * dim + 2 * pair] = angle.sin();
                if 2 * pair + 1 < dim {
                    data[pos * dim + 2 * pair + 1] = angle.cos();
                }
            }
        }
        let table = Tensor::from_vec(data, (max_len, dim), &config.device)?
            .to_dtype(config.dtype)?;
        log::debug!("positional table built: max_len={max_len} embedding_dim={dim}");
        Ok(Self { config, table })
    }

    pub fn config(&self) -> &SinusoidalConfig {
        &self.config
    }

    /// Returns the full `(max_len, embedding_dim)` table.
    pub fn table(&self) -> &Tensor {
        &self.table
    }

    /// Adds position rows to a `(batch, seq, embedding_dim)` activation.
    pub fn forward(&self, embedded: &Tensor) -> Result<Tensor> {
        checks::expect_batch_seq_hidden(
            "positional input",
            embedded,
            self.config.embedding_dim,
        )?;
        let (_, seq_len, _) = embedded.dims3()?;
        if seq_len > self.config.max_len {
            return Err(Error::Msg(format!(
                "sequence length {seq_len} exceeds positional max_len {}",
                self.config.max_len
            )));
        }
        let rows = self.table.narrow(0, 0, seq_len)?;
        let rows = if rows.dtype() == embedded.dtype() {
            rows
        } else {
            rows.to_dtype(embedded.dtype())?
        };
        embedded.broadcast_add(&rows.unsqueeze(0)?)
    }
}
