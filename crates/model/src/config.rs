//! Top-level model hyperparameters.

use candle_core::{DType, Device, Error, Result};
use embedding::SinusoidalConfig;
use layers::mlp::FeedForwardConfig;
use layers::norm::NormConfig;
use layers::MultiHeadConfig;

/// Hyperparameters for an encoder/decoder transformer.
#[derive(Debug, Clone)]
pub struct TransformerConfig {
    pub source_vocab_size: usize,
    pub target_vocab_size: usize,
    /// Longest sequence the positional table covers.
    pub max_len: usize,
    pub embedding_dim: usize,
    pub head_count: usize,
    /// Width of the feed-forward expansion.
    pub inner_dim: usize,
    /// Number of stacked layers in each of the encoder and decoder.
    pub n_layers: usize,
    pub dropout_p: Option<f32>,
    pub dtype: DType,
    pub device: Device,
}

impl TransformerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.source_vocab_size == 0 {
            return Err(Error::Msg(
                "transformer source_vocab_size must be positive".to_string(),
            ));
        }
        if self.target_vocab_size == 0 {
            return Err(Error::Msg(
                "transformer target_vocab_size must be positive".to_string(),
            ));
        }
        if self.max_len == 0 {
            return Err(Error::Msg("transformer max_len must be positive".to_string()));
        }
        if self.n_layers == 0 {
            return Err(Error::Msg("transformer n_layers must be positive".to_string()));
        }
        // Layer norm statistics need at least two hidden values.
        if self.embedding_dim < 2 {
            return Err(Error::Msg(format!(
                "transformer embedding_dim must be at least 2, got {}",
                self.embedding_dim
            )));
        }
        self.multi_head_config().validate()?;
        self.feed_forward_config().validate()?;
        self.norm_config().validate()?;
        Ok(())
    }

    pub fn multi_head_config(&self) -> MultiHeadConfig {
        MultiHeadConfig {
            embedding_dim: self.embedding_dim,
            head_count: self.head_count,
            dropout_p: self.dropout_p,
        }
    }

    pub fn feed_forward_config(&self) -> FeedForwardConfig {
        FeedForwardConfig {
            hidden_size: self.embedding_dim,
            inner_dim: self.inner_dim,
            dropout_p: self.dropout_p,
        }
    }

    pub fn norm_config(&self) -> NormConfig {
        NormConfig::new(self.embedding_dim)
    }

    pub fn sinusoidal_config(&self) -> SinusoidalConfig {
        SinusoidalConfig {
            max_len: self.max_len,
            embedding_dim: self.embedding_dim,
            dtype: self.dtype,
            device: self.device.clone(),
        }
    }
}
