//! Picks the inference route for a model directory from the files it holds.
use super::runtime_trait::{InferenceRoute, ModelFormat};
use crate::error::{PanelError, PanelResult};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const QUANTIZED_EXTENSION: &str = "gguf";
pub const CHECKPOINT_CONFIG: &str = "config.json";

pub struct FormatDetector;

impl FormatDetector {
    pub fn is_quantized_file(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(QUANTIZED_EXTENSION))
            .unwrap_or(false)
    }

    /// First `.gguf` file in the directory, by file name.
    pub fn find_quantized_file(dir: &Path) -> PanelResult<Option<PathBuf>> {
        let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && Self::is_quantized_file(path))
            .collect();
        candidates.sort();
        Ok(candidates.into_iter().next())
    }

    pub fn has_checkpoint(dir: &Path) -> bool {
        dir.join(CHECKPOINT_CONFIG).is_file()
    }

    /// A quantized file always wins, even when a checkpoint sits next to it.
    pub fn select_route(dir: &Path) -> PanelResult<InferenceRoute> {
        if !dir.is_dir() {
            return Err(PanelError::UnsupportedModel(format!(
                "Model directory does not exist: {}",
                dir.display()
            )));
        }

        if let Some(model_file) = Self::find_quantized_file(dir)? {
            debug!("Native route selected: {}", model_file.display());
            return Ok(InferenceRoute::Native { model_file });
        }

        if Self::has_checkpoint(dir) {
            debug!("Fallback route selected: {}", dir.display());
            return Ok(InferenceRoute::Fallback {
                checkpoint_dir: dir.to_path_buf(),
            });
        }

        let is_empty = std::fs::read_dir(dir)?.next().is_none();
        if is_empty {
            Err(PanelError::UnsupportedModel(
                "No files found in the model directory. Download may have failed.".to_string(),
            ))
        } else {
            Err(PanelError::UnsupportedModel(
                "No GGUF model file found and no alternative model format detected. The model may not be compatible."
                    .to_string(),
            ))
        }
    }

    /// Like `select_route`, but `None` instead of an error for unusable layouts.
    pub fn detect_format(dir: &Path) -> Option<ModelFormat> {
        Self::select_route(dir).ok().map(|route| route.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_quantized_file_selects_native() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ggml-model-i2_s.gguf"), b"GGUF").unwrap();

        let route = FormatDetector::select_route(dir.path()).unwrap();
        assert_eq!(
            route,
            InferenceRoute::Native { model_file: dir.path().join("ggml-model-i2_s.gguf") }
        );
    }

    #[test]
    fn test_checkpoint_only_selects_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), b"{}").unwrap();
        fs::write(dir.path().join("model.safetensors"), b"").unwrap();

        let route = FormatDetector::select_route(dir.path()).unwrap();
        assert_eq!(
            route,
            InferenceRoute::Fallback { checkpoint_dir: dir.path().to_path_buf() }
        );
    }

    #[test]
    fn test_native_wins_when_both_layouts_present() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), b"{}").unwrap();
        fs::write(dir.path().join("model.safetensors"), b"").unwrap();
        fs::write(dir.path().join("ggml-model-tl1.gguf"), b"GGUF").unwrap();

        let route = FormatDetector::select_route(dir.path()).unwrap();
        assert_eq!(route.format(), ModelFormat::QuantizedBinary);
    }

    #[test]
    fn test_first_quantized_file_by_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.gguf"), b"").unwrap();
        fs::write(dir.path().join("a.GGUF"), b"").unwrap();

        match FormatDetector::select_route(dir.path()).unwrap() {
            InferenceRoute::Native { model_file } => {
                assert_eq!(model_file.file_name().unwrap(), "a.GGUF")
            }
            other => panic!("unexpected route {:?}", other),
        }
    }

    #[test]
    fn test_empty_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = FormatDetector::select_route(dir.path()).unwrap_err();
        assert!(err.to_string().contains("No files found"));
    }

    #[test]
    fn test_unknown_layout_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), b"hi").unwrap();
        assert_eq!(FormatDetector::detect_format(dir.path()), None);
        let err = FormatDetector::select_route(dir.path()).unwrap_err();
        assert!(err.to_string().contains("No GGUF model file found"));
    }
}
