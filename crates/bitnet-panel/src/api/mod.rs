//! HTTP handlers. Each one maps onto a single component; failures are returned
//! as `PanelError` and rendered as the JSON error envelope.

pub mod download_api;
pub mod form;
pub mod generate_api;
pub mod status_api;
pub mod upload_api;

pub use download_api::{download_model, download_progress};
pub use generate_api::generate;
pub use status_api::{list_models, load_model, model_status, toolchain_report};
pub use upload_api::upload_model;

use crate::error::PanelResult;
use tracing::warn;

/// Count the request under `route` and log failures.
fn record<T>(route: &str, result: PanelResult<T>) -> PanelResult<T> {
    match &result {
        Ok(_) => crate::metrics::inc_request(route, "ok"),
        Err(e) => {
            warn!("{} failed: {}", route, e);
            crate::metrics::inc_request(route, e.kind());
        }
    }
    result
}
