//! Encoder and decoder stacks with the final vocabulary projection.

use std::sync::OnceLock;

use candle_core::{Result, Tensor, Var};
use embedding::{SinusoidalEncoding, TokenEmbedding};
use layers::{Linear, Mode, PrecisionPolicy};
use layers::linear::{LinearConfig, LinearInit};

use crate::block::{DecoderLayer, EncoderLayer};
use crate::config::TransformerConfig;

/// Source-side stack: token embedding, positional signal, encoder layers.
pub struct Encoder {
    embedding: TokenEmbedding,
    positional: SinusoidalEncoding,
    layers: Vec<EncoderLayer>,
}

impl Encoder {
    pub fn with_init(config: &TransformerConfig) -> Result<Self> {
        let mut layers = Vec::with_capacity(config.n_layers);
        for _ in 0..config.n_layers {
            layers.push(EncoderLayer::with_init(config)?);
        }
        Ok(Self {
            embedding: TokenEmbedding::with_init(
                config.source_vocab_size,
                config.embedding_dim,
                config.dtype,
                &config.device,
            )?,
            positional: SinusoidalEncoding::new(config.sinusoidal_config())?,
            layers,
        })
    }

    /// Encodes `(batch, src_len)` source ids into `(batch, src_len, embedding_dim)`.
    pub fn forward(
        &self,
        source_ids: &Tensor,
        source_mask: Option<&Tensor>,
        policy: &PrecisionPolicy,
        mode: Mode,
    ) -> Result<Tensor> {
        let embedded = self.embedding.forward(source_ids)?;
        let mut hidden = self.positional.forward(&embedded)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, source_mask, policy, mode)?;
        }
        Ok(hidden)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self
            .embedding
            .named_parameters(&format!("{scope}.embedding"));
        for (index, layer) in self.layers.iter().enumerate() {
            params.extend(layer.named_parameters(&format!("{scope}.layers.{index}")));
        }
        params
    }
}

/// Target-side stack: embedding, positional signal, decoder layers.
pub struct Decoder {
    embedding: TokenEmbedding,
    positional: SinusoidalEncoding,
    layers: Vec<DecoderLayer>,
}

impl Decoder {
    pub fn with_init(config: &TransformerConfig) -> Result<Self> {
        let mut layers = Vec::with_capacity(config.n_layers);
        for _ in 0..config.n_layers {
            layers.push(DecoderLayer::with_init(config)?);
        }
        Ok(Self {
            embedding: TokenEmbedding::with_init(
                config.target_vocab_size,
                config.embedding_dim,
                config.dtype,
                &config.device,
            )?,
            positional: SinusoidalEncoding::new(config.sinusoidal_config())?,
            layers,
        })
    }

    /// Decodes `(batch, tgt_len)` target ids against the encoder output.
    pub fn forward(
        &self,
        target_ids: &Tensor,
        encoder_output: &Tensor,
        target_mask: Option<&Tensor>,
        source_mask: Option<&Tensor>,
        policy: &PrecisionPolicy,
        mode: Mode,
    ) -> Result<Tensor> {
        let embedded = self.embedding.forward(target_ids)?;
        let mut hidden = self.positional.forward(&embedded)?;
        for layer in &self.layers {
            hidden = layer.forward(
                &hidden,
                encoder_output,
                target_mask,
                source_mask,
                policy,
                mode,
            )?;
        }
        Ok(hidden)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self
            .embedding
            .named_parameters(&format!("{scope}.embedding"));
        for (index, layer) in self.layers.iter().enumerate() {
            params.extend(layer.named_parameters(&format!("{scope}.layers.{index}")));
        }
        params
    }
}

/// Full sequence-to-sequence transformer producing unnormalised logits.
pub struct Transformer {
    config: TransformerConfig,
    policy: PrecisionPolicy,
    encoder: Encoder,
    decoder: Decoder,
    projection: Linear,
    first_forward: OnceLock<()>,
}

impl Transformer {
    pub fn new(config: TransformerConfig) -> Result<Self> {
        config.validate()?;
        let encoder = Encoder::with_init(&config)?;
        let decoder = Decoder::with_init(&config)?;
        let projection = Linear::with_init(
            LinearConfig {
                input_dim: config.embedding_dim,
                output_dim: config.target_vocab_size,
                bias: true,
            },
            LinearInit::XavierUniform,
            config.dtype,
            &config.device,
        )?;
        let policy = PrecisionPolicy::from_parameter_dtype(config.dtype);
        Ok(Self {
            config,
            policy,
            encoder,
            decoder,
            projection,
            first_forward: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    pub fn policy(&self) -> &PrecisionPolicy {
        &self.policy
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Runs the full forward pass.
    ///
    /// `source_ids` is `(batch, src_len)`, `target_ids` is `(batch, tgt_len)`.
    /// Masks are optional rank-3 binary tensors: `(batch, 1, src_len)` for the
    /// source and `(batch, tgt_len, tgt_len)` for the target. Returns logits
    /// of shape `(batch, tgt_len, target_vocab_size)`.
    pub fn forward(
        &self,
        source_ids: &Tensor,
        source_mask: Option<&Tensor>,
        target_ids: &Tensor,
        target_mask: Option<&Tensor>,
        mode: Mode,
    ) -> Result<Tensor> {
        self.first_forward.get_or_init(|| {
            log::info!(
                "transformer forward: layers={} heads={} embedding_dim={} params={}",
                self.config.n_layers,
                self.config.head_count,
                self.config.embedding_dim,
                self.parameter_count()
            );
        });
        let memory = self
            .encoder
            .forward(source_ids, source_mask, &self.policy, mode)?;
        let decoded = self.decoder.forward(
            target_ids,
            &memory,
            target_mask,
            source_mask,
            &self.policy,
            mode,
        )?;
        self.projection.forward(&decoded, &self.policy)
    }

    /// All trainable parameters with stable dotted names.
    pub fn named_parameters(&self) -> Vec<(String, Var)> {
        let mut params = self.encoder.named_parameters("encoder");
        params.extend(self.decoder.named_parameters("decoder"));
        params.extend(self.projection.named_parameters("projection"));
        params
    }

    /// Total number of trainable scalar values.
    pub fn parameter_count(&self) -> usize {
        self.named_parameters()
            .iter()
            .map(|(_, var)| var.as_tensor().elem_count())
            .sum()
    }
}
