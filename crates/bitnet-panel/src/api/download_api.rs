//! Model download endpoints: start a download and poll its progress.

use axum::{
    extract::{rejection::FormRejection, Query, State},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{form, record};
use crate::acquisition::{DownloadProgress, JobId};
use crate::error::{PanelError, PanelResult};
use crate::shared_state::PanelState;

#[derive(Debug, Deserialize)]
pub struct DownloadForm {
    #[serde(default)]
    pub model_name: String,
    pub background: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub status: &'static str,
    pub message: String,
    pub job_id: JobId,
}

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub job_id: Option<String>,
}

pub async fn download_model(
    State(state): State<PanelState>,
    form: Result<Form<DownloadForm>, FormRejection>,
) -> PanelResult<Json<DownloadResponse>> {
    record("/download-model", start_download(&state, form).await).map(Json)
}

async fn start_download(
    state: &PanelState,
    form: Result<Form<DownloadForm>, FormRejection>,
) -> PanelResult<DownloadResponse> {
    let req = form::accept(form)?;
    if req.model_name.trim().is_empty() {
        return Err(PanelError::InvalidModelId("model_name is required".to_string()));
    }
    let background = form::flag("background", req.background.as_deref(), true)?;

    if background {
        let (job_id, id) = state.downloader.start(&req.model_name)?;
        Ok(DownloadResponse {
            status: "success",
            message: format!("Started downloading model {} in background", id),
            job_id,
        })
    } else {
        let (job_id, model) = state.downloader.download(&req.model_name).await?;
        info!("Foreground download finished: {}", model.name);
        Ok(DownloadResponse {
            status: "success",
            message: format!("Model {} downloaded successfully", req.model_name.trim()),
            job_id,
        })
    }
}

/// Without `job_id`, reports the most recently started download.
pub async fn download_progress(
    State(state): State<PanelState>,
    Query(query): Query<ProgressQuery>,
) -> PanelResult<Json<DownloadProgress>> {
    let result = match query.job_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        Some(job_id) => state
            .tracker
            .get(job_id)
            .ok_or_else(|| PanelError::UnknownJob(job_id.to_string())),
        None => Ok(state.tracker.latest()),
    };
    record("/download-progress", result).map(Json)
}
