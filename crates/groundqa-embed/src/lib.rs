use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use groundqa_core::config::{resolve_with_base, EmbeddingSettings};
use groundqa_core::traits::Embedder;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use device::select_device;
pub use pool::{l2_normalize, masked_mean, masked_mean_l2};
pub use tokenize::tokenize_on_device;

/// BERT-family sentence encoder (e.g. `paraphrase-MiniLM-L3-v2`) loaded from a
/// local directory holding `tokenizer.json`, `config.json` and either
/// `model.safetensors` or `pytorch_model.bin`. Mean-pools the last hidden
/// layer over the attention mask.
pub struct SentenceEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    pad_id: u32,
    normalize: bool,
}

impl SentenceEncoder {
    pub fn load(model_dir: &Path, settings: &EmbeddingSettings) -> Result<Self> {
        let device = select_device();
        info!(model_dir = %model_dir.display(), "loading sentence encoder");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let pad_id = tokenizer.get_padding().map_or(0, |p| p.pad_id);

        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?,
        )?;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;

        let encoder = Self {
            model,
            tokenizer,
            device,
            dim: settings.dim,
            max_len: settings.max_len,
            pad_id,
            normalize: settings.normalize,
        };
        // Probe once so a dimension mismatch fails at startup, not per query.
        let probe = encoder.embed_one("dimension probe")?;
        if probe.len() != settings.dim {
            return Err(anyhow!(
                "encoder produces {}-dim vectors but embedding.dim is {}",
                probe.len(),
                settings.dim
            ));
        }
        info!(dim = encoder.dim, max_len = encoder.max_len, "sentence encoder loaded");
        Ok(encoder)
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) =
            tokenize_on_device(&self.tokenizer, text, self.max_len, self.pad_id, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = if self.normalize {
            masked_mean_l2(&hidden, &attention_mask)?
        } else {
            masked_mean(&hidden, &attention_mask)?
        };
        let v: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 {
            warn!(elapsed_ms = elapsed.as_millis(), "slow query embedding");
        } else {
            debug!(elapsed_ms = elapsed.as_millis(), "query embedded");
        }
        Ok(v)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        debug!(path = %safetensors.display(), "loading safetensors weights");
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        debug!(path = %pickle.display(), "loading pytorch weights");
        let weights = candle_core::pickle::read_all(&pickle)?;
        return Ok(weights.into_iter().collect());
    }
    Err(anyhow!("no model.safetensors or pytorch_model.bin under {}", model_dir.display()))
}

impl Embedder for SentenceEncoder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_one(t)).collect()
    }
}

/// Deterministic hashed bag-of-words vectors. Needs no model files; used for
/// development and tests.
pub struct FakeEmbedder { dim: usize }

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim } }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = usize::try_from(h % self.dim as u64).unwrap_or(0);
            let val = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += val + (i % 3) as f32 * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Build the configured embedder. `base` anchors a relative `model_dir`.
pub fn embedder_from_settings(settings: &EmbeddingSettings, base: &Path) -> Result<Box<dyn Embedder>> {
    if settings.use_fake {
        info!(dim = settings.dim, "using FakeEmbedder");
        return Ok(Box::new(FakeEmbedder::new(settings.dim)));
    }
    let model_dir = resolve_with_base(base, &settings.model_dir);
    if !model_dir.exists() {
        return Err(anyhow!("embedding model directory not found: {}", model_dir.display()));
    }
    Ok(Box::new(SentenceEncoder::load(&model_dir, settings)?))
}
