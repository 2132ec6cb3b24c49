//! Native BitNet runtime adapter
//!
//! Runs the BitNet inference runner (`run_inference.py` / `llama-cli` wrapper)
//! once per request as a child process and returns its standard output.

use async_trait::async_trait;
use super::runtime_trait::*;
use crate::error::{PanelError, PanelResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct NativeRunner {
    pub program: String,
    pub leading_args: Vec<String>,
    pub timeout: Duration,
}

impl NativeRunner {
    /// Whether the runner program can be found, either as a path or on `PATH`.
    pub fn is_available(&self) -> bool {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            program.is_file()
        } else {
            which::which(&self.program).is_ok()
        }
    }
}

pub struct NativeRuntime {
    runner: NativeRunner,
    model_file: PathBuf,
}

impl NativeRuntime {
    pub fn new(runner: NativeRunner, model_file: PathBuf) -> Self {
        Self { runner, model_file }
    }

    /// Full argument vector passed to the runner program.
    pub fn build_args(&self, prompt: &str, params: &GenerationParams) -> Vec<String> {
        let mut args = self.runner.leading_args.clone();
        args.extend([
            "-m".to_string(),
            self.model_file.to_string_lossy().to_string(),
            "-p".to_string(),
            prompt.to_string(),
            "-n".to_string(),
            params.max_tokens.to_string(),
            "-temp".to_string(),
            params.temperature.to_string(),
        ]);
        if params.conversation {
            args.push("-cnv".to_string());
        }
        args
    }

    fn launch_error(&self, e: std::io::Error) -> PanelError {
        match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                PanelError::ToolchainMissing(format!(
                    "could not launch BitNet runner '{}': {}",
                    self.runner.program, e
                ))
            }
            _ => PanelError::Inference(format!("Failed to spawn BitNet runner: {}", e)),
        }
    }

    /// The interpreter started but could not open the runner script.
    fn script_missing(&self, stderr: &str) -> bool {
        let lowered = stderr.to_lowercase();
        let cannot_open = lowered.contains("no such file")
            || lowered.contains("can't open")
            || lowered.contains("cannot open");
        cannot_open
            && self
                .runner
                .leading_args
                .first()
                .map(|script| stderr.contains(script.as_str()))
                .unwrap_or(false)
    }
}

#[async_trait]
impl InferenceBackend for NativeRuntime {
    fn format(&self) -> ModelFormat {
        ModelFormat::QuantizedBinary
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> PanelResult<String> {
        let args = self.build_args(prompt, params);
        info!(
            "Running native inference: {} (model: {}, n_predict: {}, temp: {})",
            self.runner.program,
            self.model_file.display(),
            params.max_tokens,
            params.temperature
        );
        debug!("Runner args: {:?}", args);

        let mut cmd = Command::new(&self.runner.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| self.launch_error(e))?;

        let output = tokio::time::timeout(self.runner.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                PanelError::Inference(format!(
                    "BitNet runner did not finish within {} seconds",
                    self.runner.timeout.as_secs()
                ))
            })?
            .map_err(|e| PanelError::Inference(format!("Failed to collect runner output: {}", e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            warn!("BitNet runner exited with {}: {}", output.status, stderr.trim());
            if self.script_missing(&stderr) {
                return Err(PanelError::ToolchainMissing(format!(
                    "BitNet runner script is missing ({})",
                    stderr.trim()
                )));
            }
            return Err(PanelError::Inference(format!(
                "runner exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(PanelError::Inference(
                "BitNet runner produced no output".to_string(),
            ));
        }
        Ok(text)
    }

    fn metadata(&self) -> RuntimeMetadata {
        RuntimeMetadata {
            format: ModelFormat::QuantizedBinary,
            runtime_name: format!("bitnet.cpp ({})", self.runner.program),
            in_process: false,
        }
    }
}
