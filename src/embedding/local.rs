//! Local sentence-transformers embedder using candle.

use super::{Embedder, Embedding};
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use std::sync::Arc;
use tokenizers::Tokenizer;

fn model_err(context: &str, e: impl std::fmt::Display) -> BenchError {
    BenchError::Collaborator(format!("{}: {}", context, e))
}

struct Model {
    bert: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

/// BERT-family model from the Hugging Face Hub with masked mean pooling and
/// L2 normalization. Inference runs on the blocking pool.
#[derive(Clone)]
pub struct SentenceTransformerEmbedder {
    model: Arc<Model>,
    model_id: String,
    dimension: usize,
}

impl SentenceTransformerEmbedder {
    /// Download (or reuse the hub cache for) `model_id` and load it on CPU.
    /// Blocking; async callers go through `spawn_blocking`.
    pub fn load(model_id: &str) -> Result<Self> {
        let device = Device::Cpu;

        let api = Api::new().map_err(|e| model_err("Failed to create HF Hub API", e))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .map_err(|e| model_err("Failed to get config.json", e))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| model_err("Failed to get tokenizer.json", e))?;
        let weights_path = repo
            .get("model.safetensors")
            .map_err(|e| model_err("Failed to get model weights", e))?;

        let raw = std::fs::read_to_string(&config_path).map_err(|e| BenchError::io(&config_path, e))?;
        let config: BertConfig =
            serde_json::from_str(&raw).map_err(|e| model_err("Failed to parse config", e))?;
        let raw: serde_json::Value = serde_json::from_str(&raw)?;
        let dimension = raw
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| model_err("Model config", "missing hidden_size"))? as usize;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| model_err("Failed to load tokenizer", e))?;

        // SAFETY: the weights file is owned by the hub cache and not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)
                .map_err(|e| model_err("Failed to load model weights", e))?
        };
        let bert = BertModel::load(vb, &config).map_err(|e| model_err("Failed to load BERT model", e))?;

        tracing::info!(model = model_id, dimension, "Loaded local embedding model");

        Ok(Self {
            model: Arc::new(Model {
                bert,
                tokenizer,
                device,
            }),
            model_id: model_id.to_string(),
            dimension,
        })
    }
}

impl Model {
    fn forward(&self, texts: Vec<String>) -> candle_core::Result<Vec<Embedding>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts, true)
            .map_err(|e| candle_core::Error::Msg(format!("Tokenization failed: {}", e)))?;

        let batch_size = encodings.len();
        let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);

        let mut ids = Vec::with_capacity(batch_size * max_len);
        let mut mask = Vec::with_capacity(batch_size * max_len);
        for encoding in &encodings {
            let mut row_ids = encoding.get_ids().to_vec();
            let mut row_mask = encoding.get_attention_mask().to_vec();
            row_ids.resize(max_len, 0);
            row_mask.resize(max_len, 0);
            ids.extend(row_ids);
            mask.extend(row_mask);
        }
        let types = vec![0u32; batch_size * max_len];

        let input_ids = Tensor::from_vec(ids, (batch_size, max_len), &self.device)?;
        let attention_mask = Tensor::from_vec(mask, (batch_size, max_len), &self.device)?;
        let token_type_ids = Tensor::from_vec(types, (batch_size, max_len), &self.device)?;

        let output = self
            .bert
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        let mask = attention_mask
            .unsqueeze(2)?
            .to_dtype(output.dtype())?
            .broadcast_as(output.shape())?;
        let summed = (output * &mask)?.sum(1)?;
        let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
        let pooled = (summed / counts)?;

        let norms = pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
        let normalized = pooled.broadcast_div(&norms)?;

        normalized.to_vec2::<f32>()
    }
}

#[async_trait]
impl Embedder for SentenceTransformerEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || model.forward(texts))
            .await
            .map_err(|e| model_err("Embedding task failed", e))?
            .map_err(|e| model_err("Embedding inference failed", e))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
