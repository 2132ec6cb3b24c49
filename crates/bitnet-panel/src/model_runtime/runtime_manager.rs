//! Runtime Manager
//!
//! Owns the currently loaded model. The inference route is decided once in
//! `load()` and the resulting backend is stored behind an `ArcSwap`, so
//! requests never re-inspect the model directory.

use super::checkpoint_runtime::{CheckpointCache, CheckpointRuntime};
use super::format_detector::FormatDetector;
use super::native_runtime::{NativeRunner, NativeRuntime};
use super::runtime_trait::*;
use crate::config::Config;
use crate::error::{PanelError, PanelResult};
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

pub struct LoadedModel {
    pub name: String,
    pub dir: PathBuf,
    pub route: InferenceRoute,
    pub backend: Arc<dyn InferenceBackend>,
    pub loaded_at: DateTime<Utc>,
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("route", &self.route)
            .field("runtime", &self.backend.metadata().runtime_name)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// What `/model-status` reports about the active model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSnapshot {
    pub model_name: String,
    pub dir: PathBuf,
    pub format: ModelFormat,
    pub runtime: RuntimeMetadata,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutput {
    pub text: String,
    pub format: ModelFormat,
    pub elapsed_ms: u128,
}

pub struct RuntimeManager {
    current: ArcSwapOption<LoadedModel>,
    runner: NativeRunner,
    checkpoints: CheckpointCache,
}

impl RuntimeManager {
    pub fn new(config: &Config) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            runner: NativeRunner {
                program: config.runner_program.clone(),
                leading_args: config.runner_args.clone(),
                timeout: Duration::from_secs(config.generate_timeout_seconds),
            },
            checkpoints: CheckpointCache::new(),
        }
    }

    pub fn runner(&self) -> &NativeRunner {
        &self.runner
    }

    /// Select the route for `dir`, build its backend and make it current.
    pub fn load(&self, name: &str, dir: &Path) -> PanelResult<Arc<LoadedModel>> {
        let route = FormatDetector::select_route(dir)?;
        let backend: Arc<dyn InferenceBackend> = match &route {
            InferenceRoute::Native { model_file } => {
                Arc::new(NativeRuntime::new(self.runner.clone(), model_file.clone()))
            }
            InferenceRoute::Fallback { checkpoint_dir } => {
                Arc::new(CheckpointRuntime::new(checkpoint_dir.clone(), &self.checkpoints))
            }
        };

        let metadata = backend.metadata();
        info!("✅ Model '{}' loaded:", name);
        info!("  Format: {}", metadata.format.name());
        info!("  Runtime: {}", metadata.runtime_name);
        info!("  Directory: {}", dir.display());

        let model = Arc::new(LoadedModel {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            route,
            backend,
            loaded_at: Utc::now(),
        });
        self.activate(model.clone());
        Ok(model)
    }

    /// Make an already-built model current, replacing any previous one.
    pub fn activate(&self, model: Arc<LoadedModel>) {
        if let Some(previous) = self.current.swap(Some(model)) {
            if let InferenceRoute::Fallback { checkpoint_dir } = &previous.route {
                if !self.is_current_dir(checkpoint_dir) {
                    self.checkpoints.evict(checkpoint_dir);
                }
            }
        }
    }

    fn is_current_dir(&self, dir: &Path) -> bool {
        self.current
            .load_full()
            .map(|m| m.dir == dir)
            .unwrap_or(false)
    }

    pub fn unload(&self) {
        if let Some(previous) = self.current.swap(None) {
            info!("Unloading model '{}'", previous.name);
            if let InferenceRoute::Fallback { checkpoint_dir } = &previous.route {
                self.checkpoints.evict(checkpoint_dir);
            }
        }
    }

    pub fn current(&self) -> Option<Arc<LoadedModel>> {
        self.current.load_full()
    }

    pub fn snapshot(&self) -> Option<ModelSnapshot> {
        self.current().map(|m| ModelSnapshot {
            model_name: m.name.clone(),
            dir: m.dir.clone(),
            format: m.route.format(),
            runtime: m.backend.metadata(),
            loaded_at: m.loaded_at,
        })
    }

    pub async fn generate(&self, prompt: &str, params: &GenerationParams) -> PanelResult<GenerationOutput> {
        let model = self.current().ok_or(PanelError::NoModelLoaded)?;
        let started = Instant::now();
        let text = model.backend.generate(prompt, params).await?;
        let elapsed = started.elapsed();
        crate::metrics::observe_generation(model.route.format().backend(), elapsed.as_secs_f64());

        Ok(GenerationOutput {
            text,
            format: model.route.format(),
            elapsed_ms: elapsed.as_millis(),
        })
    }
}
