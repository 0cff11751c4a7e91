use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use layers::Mode;
use model::{load_checkpoint, masks, save_checkpoint, Transformer, TransformerConfig};

const PAD_TOKEN: u32 = 1;

fn build_config() -> TransformerConfig {
    TransformerConfig {
        source_vocab_size: 23,
        target_vocab_size: 23,
        max_len: 4,
        embedding_dim: 4,
        head_count: 2,
        inner_dim: 16,
        n_layers: 1,
        dropout_p: None,
        dtype: DType::F32,
        device: Device::Cpu,
    }
}

fn sample_batch(device: &Device) -> Result<(Tensor, Tensor)> {
    let source = Tensor::from_vec(vec![2u32, 2, 4, 1], (1, 4), device)?;
    let target = Tensor::from_vec(vec![2u32, 3, 4, 22], (1, 4), device)?;
    Ok((source, target))
}

fn temp_checkpoint_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("transformer-{label}-{}", std::process::id()))
}

#[test]
fn forward_produces_vocab_logits() -> Result<()> {
    let config = build_config();
    let model = Transformer::new(config.clone())?;
    let (source, target) = sample_batch(&config.device)?;
    let source_mask = masks::source_padding_mask(&source, PAD_TOKEN)?;
    let target_mask = masks::target_mask(&target, PAD_TOKEN)?;

    let logits = model.forward(
        &source,
        Some(&source_mask),
        &target,
        Some(&target_mask),
        Mode::Inference,
    )?;

    assert_eq!(logits.dims3()?, (1, 4, 23));
    let values = logits.flatten_all()?.to_vec1::<f32>()?;
    assert!(values.iter().all(|v| v.is_finite()));
    Ok(())
}

#[test]
fn inference_is_deterministic_with_dropout_configured() -> Result<()> {
    let mut config = build_config();
    config.dropout_p = Some(0.3);
    let model = Transformer::new(config.clone())?;
    let (source, target) = sample_batch(&config.device)?;

    let first = model
        .forward(&source, None, &target, None, Mode::Inference)?
        .flatten_all()?
        .to_vec1::<f32>()?;
    let second = model
        .forward(&source, None, &target, None, Mode::Inference)?
        .flatten_all()?
        .to_vec1::<f32>()?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn sequence_beyond_max_len_is_rejected() -> Result<()> {
    let config = build_config();
    let model = Transformer::new(config.clone())?;
    let source = Tensor::from_vec(vec![2u32; 5], (1, 5), &config.device)?;
    let target = Tensor::from_vec(vec![2u32, 3], (1, 2), &config.device)?;
    assert!(model
        .forward(&source, None, &target, None, Mode::Inference)
        .is_err());
    Ok(())
}

#[test]
fn invalid_head_layout_is_rejected_at_construction() {
    let mut config = build_config();
    config.head_count = 3;
    assert!(Transformer::new(config).is_err());
}

#[test]
fn parameter_names_are_unique() -> Result<()> {
    let model = Transformer::new(build_config())?;
    let params = model.named_parameters();
    let names: HashSet<&str> = params.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names.len(), params.len());
    assert!(names.contains("encoder.embedding.weight"));
    assert!(names.contains("decoder.layers.0.cross_attn.output.bias"));
    assert!(names.contains("projection.weight"));
    Ok(())
}

#[test]
fn checkpoint_round_trip_reproduces_logits() -> Result<()> {
    let config = build_config();
    let model = Transformer::new(config.clone())?;
    let (source, target) = sample_batch(&config.device)?;
    let before = model
        .forward(&source, None, &target, None, Mode::Inference)?
        .flatten_all()?
        .to_vec1::<f32>()?;

    let dir = temp_checkpoint_dir("round-trip");
    save_checkpoint(&model, &dir)?;
    let restored = load_checkpoint(config, &dir)?;
    std::fs::remove_dir_all(&dir)?;

    let after = restored
        .forward(&source, None, &target, None, Mode::Inference)?
        .flatten_all()?
        .to_vec1::<f32>()?;
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn checkpoint_rejects_mismatched_config() -> Result<()> {
    let config = build_config();
    let model = Transformer::new(config.clone())?;
    let dir = temp_checkpoint_dir("mismatch");
    save_checkpoint(&model, &dir)?;

    let mut other = config;
    other.n_layers = 3;
    let outcome = load_checkpoint(other, &dir);
    std::fs::remove_dir_all(&dir)?;
    assert!(outcome.is_err());
    Ok(())
}
