use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::PathBuf;

use crate::error::{PanelError, PanelResult};

pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=2.0;
pub const MAX_TOKENS_RANGE: RangeInclusive<u32> = 1..=4096;

/// On-disk layout of a model in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    /// Single packed `.gguf` weight file run by the native BitNet binary.
    QuantizedBinary,
    /// `config.json` + tokenizer + safetensors, run by the in-process runtime.
    Checkpoint,
}

impl ModelFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ModelFormat::QuantizedBinary => "quantized_binary",
            ModelFormat::Checkpoint => "checkpoint",
        }
    }

    /// Label of the backend that serves this format.
    pub fn backend(&self) -> &'static str {
        match self {
            ModelFormat::QuantizedBinary => "native",
            ModelFormat::Checkpoint => "fallback",
        }
    }
}

/// Which inference path a model uses. Chosen once, when the model is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceRoute {
    Native { model_file: PathBuf },
    Fallback { checkpoint_dir: PathBuf },
}

impl InferenceRoute {
    pub fn format(&self) -> ModelFormat {
        match self {
            InferenceRoute::Native { .. } => ModelFormat::QuantizedBinary,
            InferenceRoute::Fallback { .. } => ModelFormat::Checkpoint,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub conversation: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 128,
            conversation: true,
        }
    }
}

impl GenerationParams {
    /// Out-of-range values are rejected, never clamped.
    pub fn validate(&self) -> PanelResult<()> {
        if !self.temperature.is_finite() || !TEMPERATURE_RANGE.contains(&self.temperature) {
            return Err(PanelError::InvalidRequest(format!(
                "temperature must be between {} and {}, got {}",
                TEMPERATURE_RANGE.start(),
                TEMPERATURE_RANGE.end(),
                self.temperature
            )));
        }
        if !MAX_TOKENS_RANGE.contains(&self.max_tokens) {
            return Err(PanelError::InvalidRequest(format!(
                "n_predict must be between {} and {}, got {}",
                MAX_TOKENS_RANGE.start(),
                MAX_TOKENS_RANGE.end(),
                self.max_tokens
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeMetadata {
    pub format: ModelFormat,
    pub runtime_name: String,
    pub in_process: bool,
}

/// Prompt in, text out. Implemented by both the native and fallback paths.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn format(&self) -> ModelFormat;

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> PanelResult<String>;

    fn metadata(&self) -> RuntimeMetadata;
}
