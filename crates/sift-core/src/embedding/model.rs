//! BGE-small-en-v1.5 embedder over candle.
//!
//! Loads the model weights (safetensors), config, and HuggingFace tokenizer
//! from a local directory; inference is CPU-only and fully offline. Texts
//! are truncated to [`MAX_SEQ_LEN`] tokens, pooled with the `[CLS]` token,
//! and L2-normalised so dot product equals cosine similarity.

use std::fs;
use std::path::Path;

use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use tokenizers::{PaddingParams, Tokenizer, TruncationDirection, TruncationParams, TruncationStrategy};
use tracing::{debug, info};

use crate::config::{EMBED_BATCH_SIZE, MAX_SEQ_LEN};
use crate::error::EmbedError;
use crate::TextEmbedder;

/// Instruction prepended to queries (never documents) for asymmetric
/// retrieval, per the BGE model card.
pub const BGE_QUERY_PREFIX: &str = "Represent this sentence for searching relevant passages: ";

/// BGE-small-en-v1.5 embedding model.
pub struct BgeEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
}

impl std::fmt::Debug for BgeEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BgeEmbedder")
            .field("dim", &self.dim)
            .finish_non_exhaustive()
    }
}

impl BgeEmbedder {
    /// Loads the model from a directory containing `model.safetensors`,
    /// `config.json`, and `tokenizer.json`.
    pub fn from_dir(model_dir: &Path) -> Result<Self, EmbedError> {
        let weights_path = model_dir.join("model.safetensors");
        let config_path = model_dir.join("config.json");
        let tokenizer_path = model_dir.join("tokenizer.json");

        for path in [&weights_path, &config_path, &tokenizer_path] {
            if !path.exists() {
                return Err(EmbedError::ModelLoad(format!(
                    "{} not found — download the model files first",
                    path.display()
                )));
            }
        }

        let device = Device::Cpu;

        let config_bytes = fs::read(&config_path)
            .map_err(|e| EmbedError::ModelLoad(format!("{}: {e}", config_path.display())))?;
        let config: Config = serde_json::from_slice(&config_bytes)
            .map_err(|e| EmbedError::ModelLoad(format!("parse config.json: {e}")))?;
        let dim = config.hidden_size;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&weights_path], DTYPE, &device)
                .map_err(|e| EmbedError::ModelLoad(e.to_string()))?
        };
        let model =
            BertModel::load(vb, &config).map_err(|e| EmbedError::ModelLoad(e.to_string()))?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbedError::ModelLoad(format!("load tokenizer: {e}")))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQ_LEN,
                strategy: TruncationStrategy::LongestFirst,
                stride: 0,
                direction: TruncationDirection::Right,
            }))
            .map_err(|e| EmbedError::ModelLoad(format!("configure truncation: {e}")))?;
        tokenizer.with_padding(Some(PaddingParams::default()));

        info!(dim, "loaded BGE-small embedder from {}", model_dir.display());
        Ok(Self {
            model,
            tokenizer,
            device,
            dim,
        })
    }

    /// Runs one inference call over at most [`EMBED_BATCH_SIZE`] texts.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbedError::Tokenization(e.to_string()))?;

        let mut id_rows = Vec::with_capacity(encodings.len());
        let mut mask_rows = Vec::with_capacity(encodings.len());
        for enc in &encodings {
            if enc.get_ids().is_empty() {
                return Err(EmbedError::Tokenization(
                    "text tokenized to zero length".to_string(),
                ));
            }
            id_rows.push(Tensor::new(enc.get_ids(), &self.device)?);
            mask_rows.push(Tensor::new(enc.get_attention_mask(), &self.device)?);
        }

        let input_ids = Tensor::stack(&id_rows, 0)?;
        let attention_mask = Tensor::stack(&mask_rows, 0)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        // BGE uses the [CLS] token (position 0) as the sentence embedding.
        let cls = hidden.i((.., 0))?;
        let rows = cls.to_vec2::<f32>()?;
        debug!(batch = texts.len(), "embedded batch");

        Ok(rows
            .into_iter()
            .map(|mut v| {
                l2_normalize(&mut v);
                v
            })
            .collect())
    }
}

impl TextEmbedder for BgeEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_docs(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            results.extend(self.embed_batch(batch)?);
        }
        Ok(results)
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbedError> {
        let prefixed = format!("{BGE_QUERY_PREFIX}{query}");
        let mut vecs = self.embed_batch(&[prefixed])?;
        vecs.pop()
            .ok_or_else(|| EmbedError::Inference("empty result for query".to_string()))
    }
}

/// Normalises `v` in place to unit length. Near-zero vectors are left as-is.
pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm: f64 = v.iter().map(|&x| f64::from(x) * f64::from(x)).sum();
    let norm = norm.sqrt();
    if norm < 1e-10 {
        return;
    }
    let inv = (1.0 / norm) as f32;
    for x in v.iter_mut() {
        *x *= inv;
    }
}
