//! Model status, store listing, explicit loading and toolchain diagnostics.

use axum::{
    extract::{rejection::FormRejection, State},
    Form, Json,
};
use serde::{Deserialize, Serialize};

use super::{form, record};
use crate::error::{PanelError, PanelResult};
use crate::model_runtime::{ModelFormat, ModelSnapshot};
use crate::model_store::ModelEntry;
use crate::shared_state::PanelState;
use crate::toolchain::{self, ToolchainReport};

#[derive(Debug, Serialize)]
pub struct ModelStatusResponse {
    pub model_loaded: bool,
    pub current_model: Option<String>,
    pub model_name: Option<String>,
    pub format: Option<ModelFormat>,
}

impl From<Option<ModelSnapshot>> for ModelStatusResponse {
    fn from(snapshot: Option<ModelSnapshot>) -> Self {
        match snapshot {
            // A model whose directory was deleted underneath us is not usable.
            Some(s) if s.dir.is_dir() => Self {
                model_loaded: true,
                current_model: Some(s.dir.to_string_lossy().to_string()),
                model_name: Some(s.model_name),
                format: Some(s.format),
            },
            _ => Self {
                model_loaded: false,
                current_model: None,
                model_name: None,
                format: None,
            },
        }
    }
}

pub async fn model_status(State(state): State<PanelState>) -> Json<ModelStatusResponse> {
    crate::metrics::inc_request("/model-status", "ok");
    Json(state.runtime.snapshot().into())
}

#[derive(Debug, Serialize)]
pub struct ModelListResponse {
    pub models: Vec<ModelEntry>,
    pub current: Option<String>,
}

pub async fn list_models(State(state): State<PanelState>) -> PanelResult<Json<ModelListResponse>> {
    let result = state.store.list().map(|models| ModelListResponse {
        models,
        current: state.runtime.current().map(|m| m.name.clone()),
    });
    record("/models", result).map(Json)
}

#[derive(Debug, Deserialize)]
pub struct LoadForm {
    #[serde(default)]
    pub model_name: String,
}

#[derive(Debug, Serialize)]
pub struct LoadResponse {
    pub status: &'static str,
    pub message: String,
    pub format: ModelFormat,
}

pub async fn load_model(
    State(state): State<PanelState>,
    form: Result<Form<LoadForm>, FormRejection>,
) -> PanelResult<Json<LoadResponse>> {
    record("/load-model", load_from_store(&state, form)).map(Json)
}

fn load_from_store(
    state: &PanelState,
    form: Result<Form<LoadForm>, FormRejection>,
) -> PanelResult<LoadResponse> {
    let req = form::accept(form)?;
    let name = req.model_name.trim();
    if name.is_empty() {
        return Err(PanelError::InvalidModelId("model_name is required".to_string()));
    }
    state.load_stored(name)?;
    let format = state
        .runtime
        .current()
        .map(|m| m.route.format())
        .ok_or(PanelError::NoModelLoaded)?;
    Ok(LoadResponse {
        status: "success",
        message: format!("Model {} loaded", name),
        format,
    })
}

pub async fn toolchain_report(State(state): State<PanelState>) -> Json<ToolchainReport> {
    crate::metrics::inc_request("/toolchain", "ok");
    Json(toolchain::inspect(state.runtime.runner()).await)
}
