//! Encoder and decoder layers.
//!
//! Both layers use post-norm residuals: each sublayer output is added to its
//! input and the sum is normalised. The decoder's cross-attention stage takes
//! its queries from the masked self-attention output and its keys and values
//! from the encoder output, reusing the source padding mask.

use candle_core::{Result, Tensor, Var};
use layers::{FeedForward, LayerNorm, Mode, MultiHeadAttention, PrecisionPolicy};

use crate::config::TransformerConfig;

/// One encoder layer: self-attention then feed-forward, each with a
/// residual connection and layer norm.
pub struct EncoderLayer {
    self_attn: MultiHeadAttention,
    norm_attn: LayerNorm,
    mlp: FeedForward,
    norm_mlp: LayerNorm,
}

impl EncoderLayer {
    pub fn with_init(config: &TransformerConfig) -> Result<Self> {
        Ok(Self {
            self_attn: MultiHeadAttention::with_init(
                config.multi_head_config(),
                config.dtype,
                &config.device,
            )?,
            norm_attn: LayerNorm::with_init(config.norm_config(), config.dtype, &config.device)?,
            mlp: FeedForward::with_init(
                config.feed_forward_config(),
                config.dtype,
                &config.device,
            )?,
            norm_mlp: LayerNorm::with_init(config.norm_config(), config.dtype, &config.device)?,
        })
    }

    pub fn forward(
        &self,
        hidden: &Tensor,
        source_mask: Option<&Tensor>,
        policy: &PrecisionPolicy,
        mode: Mode,
    ) -> Result<Tensor> {
        let attended = self
            .self_attn
            .forward(hidden, hidden, hidden, source_mask, policy, mode)?;
        let hidden = self.norm_attn.forward(&(attended + hidden)?, policy)?;

        let fed = self.mlp.forward(&hidden, policy, mode)?;
        self.norm_mlp.forward(&(fed + &hidden)?, policy)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self.self_attn.named_parameters(&format!("{scope}.self_attn"));
        params.extend(self.norm_attn.named_parameters(&format!("{scope}.norm_attn")));
        params.extend(self.mlp.named_parameters(&format!("{scope}.mlp")));
        params.extend(self.norm_mlp.named_parameters(&format!("{scope}.norm_mlp")));
        params
    }
}

/// One decoder layer: masked self-attention, cross-attention over the
/// encoder output, then feed-forward.
pub struct DecoderLayer {
    self_attn: MultiHeadAttention,
    norm_self: LayerNorm,
    cross_attn: MultiHeadAttention,
    norm_cross: LayerNorm,
    mlp: FeedForward,
    norm_mlp: LayerNorm,
}

impl DecoderLayer {
    pub fn with_init(config: &TransformerConfig) -> Result<Self> {
        Ok(Self {
            self_attn: MultiHeadAttention::with_init(
                config.multi_head_config(),
                config.dtype,
                &config.device,
            )?,
            norm_self: LayerNorm::with_init(config.norm_config(), config.dtype, &config.device)?,
            cross_attn: MultiHeadAttention::with_init(
                config.multi_head_config(),
                config.dtype,
                &config.device,
            )?,
            norm_cross: LayerNorm::with_init(config.norm_config(), config.dtype, &config.device)?,
            mlp: FeedForward::with_init(
                config.feed_forward_config(),
                config.dtype,
                &config.device,
            )?,
            norm_mlp: LayerNorm::with_init(config.norm_config(), config.dtype, &config.device)?,
        })
    }

    pub fn forward(
        &self,
        hidden: &Tensor,
        encoder_output: &Tensor,
        target_mask: Option<&Tensor>,
        source_mask: Option<&Tensor>,
        policy: &PrecisionPolicy,
        mode: Mode,
    ) -> Result<Tensor> {
        let attended = self
            .self_attn
            .forward(hidden, hidden, hidden, target_mask, policy, mode)?;
        let queries = self.norm_self.forward(&(attended + hidden)?, policy)?;

        let crossed = self.cross_attn.forward(
            &queries,
            encoder_output,
            encoder_output,
            source_mask,
            policy,
            mode,
        )?;
        let hidden = self.norm_cross.forward(&(crossed + &queries)?, policy)?;

        let fed = self.mlp.forward(&hidden, policy, mode)?;
        self.norm_mlp.forward(&(fed + &hidden)?, policy)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self.self_attn.named_parameters(&format!("{scope}.self_attn"));
        params.extend(self.norm_self.named_parameters(&format!("{scope}.norm_self")));
        params.extend(self.cross_attn.named_parameters(&format!("{scope}.cross_attn")));
        params.extend(self.norm_cross.named_parameters(&format!("{scope}.norm_cross")));
        params.extend(self.mlp.named_parameters(&format!("{scope}.mlp")));
        params.extend(self.norm_mlp.named_parameters(&format!("{scope}.norm_mlp")));
        params
    }
}
