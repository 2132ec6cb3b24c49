//! Direct upload of a `.gguf` model file.

use axum::extract::{multipart::MultipartRejection, Multipart, State};
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};

use super::record;
use crate::acquisition::UploadWriter;
use crate::error::{PanelError, PanelResult};
use crate::shared_state::PanelState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub message: String,
    pub model_name: String,
}

pub async fn upload_model(
    State(state): State<PanelState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> PanelResult<Json<UploadResponse>> {
    record("/upload-model", store_upload(&state, multipart).await).map(Json)
}

async fn store_upload(
    state: &PanelState,
    multipart: Result<Multipart, MultipartRejection>,
) -> PanelResult<UploadResponse> {
    let mut multipart = multipart
        .map_err(|e| PanelError::UploadRejected(format!("Invalid multipart payload: {}", e.body_text())))?;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| PanelError::UploadRejected(format!("Failed reading multipart field: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let target = state.store.upload_target(&file_name)?;
        info!("Receiving upload {} into {}", file_name, target.dir.display());

        // dropping the writer on any early return discards the partial file
        let mut writer = UploadWriter::create(target).await?;
        while let Some(chunk) = field.chunk().await.map_err(|e| {
            warn!("Upload of {} interrupted: {}", file_name, e);
            PanelError::UploadRejected(format!("Failed reading uploaded file: {}", e))
        })? {
            writer.write_chunk(&chunk).await?;
        }
        let stored = writer.commit().await?;

        state.runtime.load(&stored.model_name, &stored.dir)?;
        return Ok(UploadResponse {
            status: "success",
            message: "Model uploaded successfully".to_string(),
            model_name: stored.model_name,
        });
    }

    Err(PanelError::UploadRejected("No file provided".to_string()))
}
