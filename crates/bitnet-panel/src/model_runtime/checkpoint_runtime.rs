//! Checkpoint Runtime Adapter
//!
//! Fallback path for models that ship as a standard checkpoint directory
//! (`config.json`, `tokenizer.json`, and `*.safetensors` or a single PyTorch
//! `.bin`/`.pt` file) rather than a packed `.gguf`. Weights are loaded in-process with candle on first use and kept
//! in a process-wide cache keyed by directory.

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::llama::{Cache, Config as LlamaModelConfig, Llama, LlamaConfig, LlamaEosToks};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::format_detector::CHECKPOINT_CONFIG;
use super::runtime_trait::*;
use crate::error::{PanelError, PanelResult};

const TOP_P: f64 = 0.9;
const TOP_K: usize = 40;
const REPEAT_PENALTY: f32 = 1.1;
const REPEAT_LAST_N: usize = 64;

const PICKLE_EXTENSIONS: &[&str] = &["bin", "pt", "pth"];

type CheckpointCell = Arc<OnceCell<Arc<LoadedCheckpoint>>>;

/// Weight files of a checkpoint. Safetensors win when both kinds are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightFiles {
    SafeTensors(Vec<PathBuf>),
    Pickle(PathBuf),
}

impl WeightFiles {
    pub fn find(dir: &Path) -> PanelResult<Self> {
        let mut safetensors = Vec::new();
        let mut pickles = Vec::new();
        for path in std::fs::read_dir(dir)?.flatten().map(|entry| entry.path()) {
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if ext == "safetensors" {
                safetensors.push(path);
            } else if PICKLE_EXTENSIONS.contains(&ext) {
                pickles.push(path);
            }
        }

        if !safetensors.is_empty() {
            safetensors.sort();
            return Ok(WeightFiles::SafeTensors(safetensors));
        }
        match pickles.len() {
            0 => Err(PanelError::UnsupportedModel(format!(
                "No model weights (.safetensors, .bin or .pt) found in {}",
                dir.display()
            ))),
            1 => Ok(WeightFiles::Pickle(pickles.remove(0))),
            n => Err(PanelError::UnsupportedModel(format!(
                "Found {} PyTorch weight shards in {}; sharded .bin checkpoints must be converted to .safetensors",
                n,
                dir.display()
            ))),
        }
    }

    fn count(&self) -> usize {
        match self {
            WeightFiles::SafeTensors(files) => files.len(),
            WeightFiles::Pickle(_) => 1,
        }
    }

    fn var_builder(&self, device: &Device) -> PanelResult<VarBuilder<'static>> {
        let vb = match self {
            // SAFETY: the weight files are not modified while mapped.
            WeightFiles::SafeTensors(files) => unsafe {
                VarBuilder::from_mmaped_safetensors(files, DType::F32, device)?
            },
            WeightFiles::Pickle(file) => VarBuilder::from_pth(file, DType::F32, device)?,
        };
        Ok(vb)
    }
}

/// Loaded checkpoints shared by every runtime pointing at the same directory.
#[derive(Default)]
pub struct CheckpointCache {
    entries: DashMap<PathBuf, CheckpointCell>,
}

impl CheckpointCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell_for(&self, dir: &Path) -> CheckpointCell {
        self.entries
            .entry(dir.to_path_buf())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    pub fn is_loaded(&self, dir: &Path) -> bool {
        self.entries
            .get(dir)
            .map(|cell| cell.initialized())
            .unwrap_or(false)
    }

    pub fn evict(&self, dir: &Path) {
        self.entries.remove(dir);
    }
}

pub struct LoadedCheckpoint {
    model: Llama,
    config: LlamaModelConfig,
    tokenizer: Tokenizer,
    device: Device,
    eos_tokens: Vec<u32>,
}

impl LoadedCheckpoint {
    pub fn load(dir: &Path) -> PanelResult<Self> {
        info!("Loading checkpoint from {}", dir.display());

        let raw_config = std::fs::read(dir.join(CHECKPOINT_CONFIG))?;
        let llama_config: LlamaConfig = serde_json::from_slice(&raw_config).map_err(|e| {
            PanelError::UnsupportedModel(format!("Unsupported checkpoint config.json: {}", e))
        })?;
        let config = llama_config.into_config(false);

        let tokenizer = Tokenizer::from_file(dir.join("tokenizer.json")).map_err(|e| {
            PanelError::UnsupportedModel(format!("Failed to load tokenizer.json: {}", e))
        })?;

        let weights = WeightFiles::find(dir)?;
        let device = Device::Cpu;
        let vb = weights.var_builder(&device)?;
        let model = Llama::load(vb, &config)?;

        let eos_tokens = match &config.eos_token_id {
            Some(LlamaEosToks::Single(id)) => vec![*id],
            Some(LlamaEosToks::Multiple(ids)) => ids.clone(),
            None => ["</s>", "<|endoftext|>", "<|eot_id|>"]
                .iter()
                .filter_map(|t| tokenizer.token_to_id(t))
                .collect(),
        };

        info!(
            "Checkpoint loaded: {} layers, vocab {}, {} weight file(s)",
            config.num_hidden_layers,
            config.vocab_size,
            weights.count()
        );

        Ok(Self {
            model,
            config,
            tokenizer,
            device,
            eos_tokens,
        })
    }

    /// Returns only the newly generated text, not the prompt.
    pub fn generate(&self, prompt: &str, params: &GenerationParams, seed: u64) -> PanelResult<String> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| PanelError::Inference(format!("Tokenization failed: {}", e)))?;
        let mut tokens = encoding.get_ids().to_vec();
        let prompt_len = tokens.len();
        if prompt_len >= self.config.max_position_embeddings {
            return Err(PanelError::InvalidRequest(format!(
                "Prompt is {} tokens, the model accepts at most {}",
                prompt_len, self.config.max_position_embeddings
            )));
        }

        let sampling = if params.temperature <= 0.0 {
            Sampling::ArgMax
        } else {
            Sampling::TopKThenTopP {
                k: TOP_K,
                p: TOP_P,
                temperature: params.temperature as f64,
            }
        };
        let mut sampler = LogitsProcessor::from_sampling(seed, sampling);
        let mut cache = Cache::new(true, DType::F32, &self.config, &self.device)?;

        let mut index_pos = 0;
        for step in 0..params.max_tokens as usize {
            let context = if step > 0 {
                &tokens[tokens.len() - 1..]
            } else {
                &tokens[..]
            };
            let input = Tensor::new(context, &self.device)?.unsqueeze(0)?;
            let logits = self.model.forward(&input, index_pos, &mut cache)?;
            let logits = logits.squeeze(0)?;
            let start = tokens.len().saturating_sub(REPEAT_LAST_N);
            let logits = candle_transformers::utils::apply_repeat_penalty(
                &logits,
                REPEAT_PENALTY,
                &tokens[start..],
            )?;
            index_pos += context.len();

            let next = sampler.sample(&logits)?;
            if self.eos_tokens.contains(&next) {
                debug!("EOS after {} tokens", step);
                break;
            }
            tokens.push(next);
            if index_pos + 1 >= self.config.max_position_embeddings {
                break;
            }
        }

        self.tokenizer
            .decode(&tokens[prompt_len..], true)
            .map(|text| text.trim().to_string())
            .map_err(|e| PanelError::Inference(format!("Decoding failed: {}", e)))
    }
}

pub struct CheckpointRuntime {
    checkpoint_dir: PathBuf,
    cell: CheckpointCell,
}

impl CheckpointRuntime {
    pub fn new(checkpoint_dir: PathBuf, cache: &CheckpointCache) -> Self {
        let cell = cache.cell_for(&checkpoint_dir);
        Self {
            checkpoint_dir,
            cell,
        }
    }

    pub fn wrap_prompt(prompt: &str, conversation: bool) -> String {
        if conversation {
            format!("System: {}\nAssistant: ", prompt)
        } else {
            prompt.to_string()
        }
    }

    async fn loaded(&self) -> PanelResult<Arc<LoadedCheckpoint>> {
        let loaded = self
            .cell
            .get_or_try_init(|| async {
                let dir = self.checkpoint_dir.clone();
                tokio::task::spawn_blocking(move || LoadedCheckpoint::load(&dir).map(Arc::new))
                    .await
                    .map_err(|e| PanelError::Inference(format!("Checkpoint loader failed: {}", e)))?
            })
            .await?;
        Ok(loaded.clone())
    }
}

#[async_trait]
impl InferenceBackend for CheckpointRuntime {
    fn format(&self) -> ModelFormat {
        ModelFormat::Checkpoint
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> PanelResult<String> {
        let loaded = self.loaded().await?;
        let full_prompt = Self::wrap_prompt(prompt, params.conversation);
        let params = params.clone();
        let seed = rand::random::<u64>();

        info!(
            "Running fallback inference on {} (max_tokens: {}, temp: {})",
            self.checkpoint_dir.display(),
            params.max_tokens,
            params.temperature
        );

        tokio::task::spawn_blocking(move || loaded.generate(&full_prompt, &params, seed))
            .await
            .map_err(|e| PanelError::Inference(format!("Generation task failed: {}", e)))?
    }

    fn metadata(&self) -> RuntimeMetadata {
        RuntimeMetadata {
            format: ModelFormat::Checkpoint,
            runtime_name: "candle (llama)".to_string(),
            in_process: true,
        }
    }
}
