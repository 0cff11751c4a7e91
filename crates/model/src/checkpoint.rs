//! Checkpoint persistence for transformer parameters.
//!
//! A checkpoint directory holds two files: `model.safetensors` with every
//! trainable tensor keyed by its dotted parameter name, and `manifest.json`
//! recording the format version and the hyperparameters the weights were
//! built for. Loading rebuilds the model from a caller-supplied config and
//! copies weights in by name, so a manifest/config mismatch or a missing or
//! unexpected tensor is an error rather than a silent partial load. The
//! positional tables are recomputed, never persisted.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{safetensors, Error, Result, Tensor};
use serde::{Deserialize, Serialize};

use crate::config::TransformerConfig;
use crate::model::Transformer;

pub const CHECKPOINT_VERSION: u32 = 1;

const WEIGHTS_FILE: &str = "model.safetensors";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    config: ConfigSnapshot,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct ConfigSnapshot {
    source_vocab_size: usize,
    target_vocab_size: usize,
    max_len: usize,
    embedding_dim: usize,
    head_count: usize,
    inner_dim: usize,
    n_layers: usize,
    dropout_p: Option<f32>,
    dtype: String,
}

impl ConfigSnapshot {
    fn capture(config: &TransformerConfig) -> Self {
        Self {
            source_vocab_size: config.source_vocab_size,
            target_vocab_size: config.target_vocab_size,
            max_len: config.max_len,
            embedding_dim: config.embedding_dim,
            head_count: config.head_count,
            inner_dim: config.inner_dim,
            n_layers: config.n_layers,
            dropout_p: config.dropout_p,
            dtype: config.dtype.as_str().to_string(),
        }
    }
}

/// Writes the model's parameters and manifest into `dir`.
pub fn save_checkpoint(model: &Transformer, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let tensors: HashMap<String, Tensor> = model
        .named_parameters()
        .into_iter()
        .map(|(name, var)| (name, var.as_tensor().clone()))
        .collect();
    safetensors::save(&tensors, dir.join(WEIGHTS_FILE))?;

    let manifest = Manifest {
        version: CHECKPOINT_VERSION,
        config: ConfigSnapshot::capture(model.config()),
    };
    let encoded = serde_json::to_string_pretty(&manifest).map_err(Error::wrap)?;
    std::fs::write(dir.join(MANIFEST_FILE), encoded)?;
    log::info!("checkpoint saved: dir={} tensors={}", dir.display(), tensors.len());
    Ok(())
}

/// Rebuilds a model from `config` and fills it with the weights in `dir`.
pub fn load_checkpoint(config: TransformerConfig, dir: &Path) -> Result<Transformer> {
    let raw = std::fs::read_to_string(dir.join(MANIFEST_FILE))?;
    let manifest: Manifest = serde_json::from_str(&raw).map_err(Error::wrap)?;
    if manifest.version != CHECKPOINT_VERSION {
        return Err(Error::Msg(format!(
            "unsupported checkpoint version {}, expected {CHECKPOINT_VERSION}",
            manifest.version
        )));
    }
    let expected = ConfigSnapshot::capture(&config);
    if manifest.config != expected {
        return Err(Error::Msg(format!(
            "checkpoint config mismatch: saved {:?}, requested {expected:?}",
            manifest.config
        )));
    }

    let device = config.device.clone();
    let model = Transformer::new(config)?;
    let mut loaded = safetensors::load(dir.join(WEIGHTS_FILE), &device)?;
    for (name, var) in model.named_parameters() {
        let tensor = loaded.remove(&name).ok_or_else(|| {
            Error::Msg(format!("checkpoint is missing parameter {name}"))
        })?;
        var.set(&tensor)?;
    }
    if !loaded.is_empty() {
        let mut extra: Vec<String> = loaded.into_keys().collect();
        extra.sort();
        return Err(Error::Msg(format!(
            "checkpoint holds unexpected parameters: {extra:?}"
        )));
    }
    log::info!("checkpoint loaded: dir={}", dir.display());
    Ok(model)
}
