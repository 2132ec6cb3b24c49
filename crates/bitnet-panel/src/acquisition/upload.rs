//! Streams an uploaded `.gguf` into the store through a `.part` file.
//!
//! A writer that is dropped without `commit` (client disconnect, request
//! timeout, read error) leaves the store as it found it.

use tracing::info;

use super::part_file::PartFile;
use crate::error::{PanelError, PanelResult};
use crate::model_store::UploadTarget;

pub struct UploadWriter {
    target: UploadTarget,
    part: Option<PartFile>,
    created_dir: bool,
}

impl UploadWriter {
    /// `target` must come from `ModelStore::upload_target`, which has already
    /// checked the file name.
    pub async fn create(target: UploadTarget) -> PanelResult<Self> {
        let created_dir = !target.dir.exists();
        tokio::fs::create_dir_all(&target.dir).await?;
        let part = match PartFile::create(&target.file_path).await {
            Ok(part) => part,
            Err(e) => {
                if created_dir {
                    let _ = tokio::fs::remove_dir(&target.dir).await;
                }
                return Err(e);
            }
        };
        Ok(Self {
            target,
            part: Some(part),
            created_dir,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> PanelResult<()> {
        match self.part.as_mut() {
            Some(part) => part.write(chunk).await,
            None => Ok(()),
        }
    }

    pub fn written(&self) -> u64 {
        self.part.as_ref().map(PartFile::written).unwrap_or(0)
    }

    /// Move the finished file into place. Empty uploads are discarded.
    pub async fn commit(mut self) -> PanelResult<UploadTarget> {
        if self.written() == 0 {
            return Err(PanelError::UploadRejected("Uploaded file is empty".to_string()));
        }
        let Some(part) = self.part.take() else {
            return Err(PanelError::UploadRejected("Upload already finished".to_string()));
        };
        let written = part.persist(&self.target.file_path).await?;
        self.created_dir = false;
        info!(
            "Stored upload {} ({} bytes)",
            self.target.file_path.display(),
            written
        );
        Ok(self.target.clone())
    }
}

impl Drop for UploadWriter {
    fn drop(&mut self) {
        // the part file removes itself; the directory only goes if it is ours
        self.part.take();
        if self.created_dir {
            let _ = std::fs::remove_dir(&self.target.dir);
        }
    }
}
