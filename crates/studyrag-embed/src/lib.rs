//! Sentence embedding providers.
//!
//! [`SentenceEmbedder`] runs a BERT-family sentence encoder (the
//! all-MiniLM-L6-v2 layout by default) on candle with masked mean pooling
//! and L2 normalization. [`FakeEmbedder`] is a deterministic hash-based
//! stand-in for tests and offline development.
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use studyrag_core::config::{expand_path, EmbeddingSettings};
use studyrag_core::error::EmbeddingError;
use studyrag_core::traits::Embedder;
use studyrag_core::types::EmbeddingVector;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use pool::masked_mean_l2;

const DEFAULT_MODEL_DIRS: [&str; 2] = ["../models/all-MiniLM-L6-v2", "models/all-MiniLM-L6-v2"];

pub struct SentenceEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    pad_id: u32,
}

impl SentenceEmbedder {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = device::select_device();
        tracing::info!(dir = %model_dir.display(), "loading sentence encoder");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e)
        })?;
        let pad_id = tokenizer.get_padding().map(|p| p.pad_id).unwrap_or(0);
        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let dim = config.hidden_size;
        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;
        tracing::info!(dim, max_len, "sentence encoder loaded");
        Ok(Self { model, tokenizer, device, dim, max_len, pad_id })
    }

    fn forward(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize::tokenize_batch_on_device(
            &self.tokenizer,
            texts,
            self.max_len,
            self.pad_id,
            &self.device,
        )?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let out: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 500 {
            let ms = elapsed.as_millis() as u64;
            tracing::warn!(batch = texts.len(), ms, "slow embedding batch");
        }
        Ok(out)
    }
}

/// Prefer `model.safetensors`; fall back to the pickled `pytorch_model.bin`.
fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&pickle)?;
    Ok(weights.into_iter().collect())
}

impl Embedder for SentenceEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let out = self.forward(texts).map_err(|e| EmbeddingError::Inference(e.to_string()))?;
        if out.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch { expected: texts.len(), got: out.len() });
        }
        Ok(out)
    }
}

/// Deterministic bag-of-tokens embedder. Identical inputs give identical
/// unit vectors; inputs sharing tokens land close in cosine space.
pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += 0.5 + val + (i as f32 % 3.0) * 0.01;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[0] = 1.0;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn fake_requested(settings: &EmbeddingSettings) -> bool {
    settings.use_fake
        || std::env::var("APP_USE_FAKE_EMBEDDINGS")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
}

/// Build the embedder selected by configuration. This performs the expensive
/// model load; callers are expected to do it once and share the result.
pub fn get_default_embedder(
    settings: &EmbeddingSettings,
) -> Result<Box<dyn Embedder>, EmbeddingError> {
    if fake_requested(settings) {
        tracing::info!(dim = settings.dim, "using FakeEmbedder");
        return Ok(Box::new(FakeEmbedder::new(settings.dim)));
    }
    let dir = resolve_model_dir(settings)
        .map_err(|e| EmbeddingError::ModelUnavailable(e.to_string()))?;
    let model = SentenceEmbedder::load(&dir, settings.max_len)
        .map_err(|e| EmbeddingError::ModelUnavailable(e.to_string()))?;
    check_model_dim(settings.dim, model.dim())?;
    Ok(Box::new(model))
}

/// A model whose hidden size differs from `embedding.dim` would fail every
/// later index call, so it is rejected at load time.
fn check_model_dim(configured: usize, actual: usize) -> Result<(), EmbeddingError> {
    if configured != actual {
        tracing::error!(configured, actual, "embedding.dim differs from model hidden size");
        return Err(EmbeddingError::ModelUnavailable(format!(
            "model hidden size {actual} does not match embedding.dim {configured}"
        )));
    }
    Ok(())
}

fn resolve_model_dir(settings: &EmbeddingSettings) -> Result<PathBuf> {
    if let Some(dir) = &settings.model_dir {
        let p = expand_path(dir);
        if p.exists() { return Ok(p); }
        return Err(anyhow!("embedding.model_dir {} does not exist", p.display()));
    }
    if let Ok(dir) = std::env::var("MODEL_DIR") {
        let p = PathBuf::from(&dir);
        if p.exists() { return Ok(p); }
    }
    DEFAULT_MODEL_DIRS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| anyhow!("Could not locate sentence encoder model directory"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_dir_is_model_unavailable() {
        let settings = EmbeddingSettings {
            model_dir: Some("/definitely/not/here".into()),
            use_fake: false,
            dim: 384,
            max_len: 128,
        };
        match get_default_embedder(&settings) {
            Err(EmbeddingError::ModelUnavailable(msg)) => {
                assert!(msg.contains("does not exist"), "{msg}")
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("model should not load"),
        }
    }

    #[test]
    fn hidden_size_must_match_configured_dim() {
        assert!(check_model_dim(384, 384).is_ok());
        match check_model_dim(384, 768) {
            Err(EmbeddingError::ModelUnavailable(msg)) => {
                assert!(msg.contains("768") && msg.contains("384"), "{msg}")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fake_embedder_handles_empty_text() {
        let e = FakeEmbedder::new(8);
        let v = e.embed_one("").expect("embed");
        assert_eq!(v.len(), 8);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
