//! A `<name>.part` file that is moved into place on success and removed in
//! every other case, including when its owner is dropped mid-transfer.

use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::PanelResult;

pub struct PartFile {
    path: PathBuf,
    file: Option<File>,
    written: u64,
    persisted: bool,
}

/// `dest` with `.part` appended to its file name.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

impl PartFile {
    pub async fn create(dest: &Path) -> PanelResult<Self> {
        let path = part_path(dest);
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            file: Some(file),
            written: 0,
            persisted: false,
        })
    }

    pub async fn write(&mut self, chunk: &[u8]) -> PanelResult<()> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(chunk).await?;
            self.written += chunk.len() as u64;
        }
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush, close and rename onto `dest`.
    pub async fn persist(mut self, dest: &Path) -> PanelResult<u64> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }
        tokio::fs::rename(&self.path, dest).await?;
        self.persisted = true;
        Ok(self.written)
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        self.file.take();
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {}: {}", self.path.display(), e);
            }
        }
    }
}
