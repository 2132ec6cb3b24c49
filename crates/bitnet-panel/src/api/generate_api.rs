//! Text generation against the currently loaded model.

use axum::{
    extract::{rejection::FormRejection, State},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{form, record};
use crate::error::{PanelError, PanelResult};
use crate::model_runtime::{runtime_trait::MAX_TOKENS_RANGE, GenerationParams};
use crate::shared_state::PanelState;

#[derive(Debug, Deserialize)]
pub struct GenerateForm {
    #[serde(default)]
    pub prompt: String,
    pub temperature: Option<String>,
    pub n_predict: Option<String>,
    pub conversation: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub status: &'static str,
    pub output: String,
    pub backend: &'static str,
    pub elapsed_ms: u128,
}

impl GenerateForm {
    /// Validated parameters. Nothing here touches the runtime.
    pub fn params(&self) -> PanelResult<GenerationParams> {
        if self.prompt.trim().is_empty() {
            return Err(PanelError::InvalidRequest("Prompt cannot be empty".to_string()));
        }
        let defaults = GenerationParams::default();
        let temperature = form::number("temperature", self.temperature.as_deref(), defaults.temperature)?;
        let n_predict = form::number("n_predict", self.n_predict.as_deref(), defaults.max_tokens as i64)?;
        let max_tokens = u32::try_from(n_predict).map_err(|_| {
            PanelError::InvalidRequest(format!(
                "n_predict must be between {} and {}, got {}",
                MAX_TOKENS_RANGE.start(),
                MAX_TOKENS_RANGE.end(),
                n_predict
            ))
        })?;
        let params = GenerationParams {
            temperature,
            max_tokens,
            conversation: form::flag("conversation", self.conversation.as_deref(), defaults.conversation)?,
        };
        params.validate()?;
        Ok(params)
    }
}

pub async fn generate(
    State(state): State<PanelState>,
    form: Result<Form<GenerateForm>, FormRejection>,
) -> PanelResult<Json<GenerateResponse>> {
    record("/generate", run_generation(&state, form).await).map(Json)
}

async fn run_generation(
    state: &PanelState,
    form: Result<Form<GenerateForm>, FormRejection>,
) -> PanelResult<GenerateResponse> {
    let req = form::accept(form)?;
    let params = req.params()?;
    info!(
        "Generating (prompt: {} chars, n_predict: {}, temp: {}, conversation: {})",
        req.prompt.len(),
        params.max_tokens,
        params.temperature,
        params.conversation
    );

    let output = state.runtime.generate(&req.prompt, &params).await?;
    Ok(GenerateResponse {
        status: "success",
        output: output.text,
        backend: output.format.backend(),
        elapsed_ms: output.elapsed_ms,
    })
}
