//! On-disk model store: one directory per model under a single root.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{PanelError, PanelResult};
use crate::model_runtime::{FormatDetector, ModelFormat};

lazy_static! {
    static ref NAME_SEGMENT: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid regex");
}

/// Whether `segment` can be used as a store directory or hub path segment.
pub fn is_valid_segment(segment: &str) -> bool {
    NAME_SEGMENT.is_match(segment) && !segment.contains("..")
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    pub name: String,
    pub dir: PathBuf,
    pub format: Option<ModelFormat>,
    pub files: usize,
    pub size_bytes: u64,
}

/// Where an accepted upload will be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub model_name: String,
    pub dir: PathBuf,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    pub fn open(root: impl Into<PathBuf>) -> PanelResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!("Model store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Directory of a stored model, if `name` is valid and present.
    pub fn find(&self, name: &str) -> PanelResult<PathBuf> {
        if !is_valid_segment(name) {
            return Err(PanelError::InvalidModelId(name.to_string()));
        }
        let dir = self.entry_dir(name);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(PanelError::UnsupportedModel(format!(
                "Model '{}' is not in the store",
                name
            )))
        }
    }

    pub fn list(&self) -> PanelResult<Vec<ModelEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.root)?.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let (files, size_bytes) = dir_usage(&dir);
            entries.push(ModelEntry {
                format: FormatDetector::detect_format(&dir),
                name,
                dir,
                files,
                size_bytes,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Check an uploaded file name and work out where it goes. Writes nothing.
    pub fn upload_target(&self, file_name: &str) -> PanelResult<UploadTarget> {
        let base = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::trim)
            .unwrap_or("");
        if base.is_empty() {
            return Err(PanelError::UploadRejected("No file provided".to_string()));
        }
        if !FormatDetector::is_quantized_file(Path::new(base)) {
            return Err(PanelError::UploadRejected(
                "Only .gguf files are supported".to_string(),
            ));
        }

        let stem = Path::new(base)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("");
        if !is_valid_segment(stem) {
            return Err(PanelError::UploadRejected(format!(
                "Invalid model file name: {}",
                base
            )));
        }

        let dir = self.entry_dir(stem);
        Ok(UploadTarget {
            model_name: stem.to_string(),
            file_path: dir.join(base),
            dir,
        })
    }
}

fn dir_usage(dir: &Path) -> (usize, u64) {
    let mut files = 0;
    let mut bytes = 0;
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            match entry.metadata() {
                Ok(meta) if meta.is_dir() => pending.push(entry.path()),
                Ok(meta) => {
                    files += 1;
                    bytes += meta.len();
                }
                Err(_) => {}
            }
        }
    }
    (files, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_segment_validation() {
        assert!(is_valid_segment("bitnet_b1_58-large"));
        assert!(is_valid_segment("Falcon3-1B-Instruct-1.58bit"));
        assert!(!is_valid_segment(".."));
        assert!(!is_valid_segment("a..b"));
        assert!(!is_valid_segment("-leading-dash"));
        assert!(!is_valid_segment("with space"));
        assert!(!is_valid_segment(""));
    }

    #[test]
    fn test_upload_target_for_gguf() {
        let root = tempfile::tempdir().unwrap();
        let store = ModelStore::open(root.path()).unwrap();

        let target = store.upload_target("ggml-model-i2_s.gguf").unwrap();
        assert_eq!(target.model_name, "ggml-model-i2_s");
        assert_eq!(target.file_path, root.path().join("ggml-model-i2_s/ggml-model-i2_s.gguf"));
        assert!(!target.dir.exists());
    }

    #[test]
    fn test_upload_target_strips_client_paths() {
        let root = tempfile::tempdir().unwrap();
        let store = ModelStore::open(root.path()).unwrap();

        let target = store.upload_target("../../etc/model.gguf").unwrap();
        assert_eq!(target.file_path, root.path().join("model/model.gguf"));
    }

    #[test]
    fn test_upload_target_rejects_other_extensions() {
        let root = tempfile::tempdir().unwrap();
        let store = ModelStore::open(root.path()).unwrap();

        let err = store.upload_target("weights.bin").unwrap_err();
        assert!(matches!(err, PanelError::UploadRejected(_)));
        assert!(store.upload_target("").is_err());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_reports_formats() {
        let root = tempfile::tempdir().unwrap();
        let store = ModelStore::open(root.path()).unwrap();

        fs::create_dir_all(root.path().join("native")).unwrap();
        fs::write(root.path().join("native/m.gguf"), b"GGUF1234").unwrap();
        fs::create_dir_all(root.path().join("ckpt")).unwrap();
        fs::write(root.path().join("ckpt/config.json"), b"{}").unwrap();
        fs::create_dir_all(root.path().join(".downloading")).unwrap();

        let entries = store.list().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["ckpt", "native"]);
        assert_eq!(entries[0].format, Some(ModelFormat::Checkpoint));
        assert_eq!(entries[1].format, Some(ModelFormat::QuantizedBinary));
        assert_eq!(entries[1].size_bytes, 8);
    }

    #[test]
    fn test_find_validates_and_checks_presence() {
        let root = tempfile::tempdir().unwrap();
        let store = ModelStore::open(root.path()).unwrap();
        fs::create_dir_all(root.path().join("present")).unwrap();

        assert_eq!(store.find("present").unwrap(), root.path().join("present"));
        assert!(matches!(store.find("../x"), Err(PanelError::InvalidModelId(_))));
        assert!(matches!(store.find("absent"), Err(PanelError::UnsupportedModel(_))));
    }
}
