//! Server startup and routing.
//!
//! Builds the shared `PanelState`, restores the default model if one is
//! configured, and serves the API plus the static front end until Ctrl+C or
//! SIGTERM.

use axum::BoxError;
use std::time::Duration;
use tracing::{info, warn};

use crate::{config::Config, error::PanelError, shared_state::PanelState};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    crate::metrics::init_metrics();
    cfg.print_config();

    let report = crate::toolchain::inspect(&crate::model_runtime::NativeRunner {
        program: cfg.runner_program.clone(),
        leading_args: cfg.runner_args.clone(),
        timeout: Duration::from_secs(cfg.generate_timeout_seconds),
    })
    .await;
    crate::toolchain::log_report(&report);

    let addr = cfg.api_addr()?;
    let state = PanelState::new(cfg)?;
    let _sweeper = state.tracker.spawn_sweeper(SWEEP_INTERVAL);

    if let Some(name) = state.config.default_model.clone() {
        match state.load_stored(&name) {
            Ok(()) => info!("Default model '{}' loaded", name),
            Err(e) => warn!("⚠️  Could not load default model '{}': {}", name, e),
        }
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🚀 BitNet panel listening on http://{}", addr);

    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

pub fn build_router(state: PanelState) -> axum::Router {
    use axum::{
        error_handling::HandleErrorLayer,
        extract::DefaultBodyLimit,
        routing::{get, post},
        Router,
    };
    use tower::{timeout::TimeoutLayer, ServiceBuilder};
    use tower_http::{
        cors::{Any, CorsLayer},
        services::{ServeDir, ServeFile},
        trace::TraceLayer,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    let static_dir = state.config.static_dir.clone();
    let upload_limit = state.config.max_upload_bytes;
    let timeout_secs = state.config.request_timeout_seconds;

    Router::new()
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(&static_dir))
        // Acquisition
        .route("/download-model", post(crate::api::download_model))
        .route("/download-progress", get(crate::api::download_progress))
        .route(
            "/upload-model",
            post(crate::api::upload_model).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Inference
        .route("/generate", post(crate::api::generate))
        // Model management
        .route("/model-status", get(crate::api::model_status))
        .route("/models", get(crate::api::list_models))
        .route("/load-model", post(crate::api::load_model))
        .route("/toolchain", get(crate::api::toolchain_report))
        .route("/metrics", get(crate::metrics::get_metrics))
        .route("/healthz", get(|| async { "OK" }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(move |err: BoxError| async move {
                    request_failed(err, timeout_secs)
                }))
                .layer(TimeoutLayer::new(Duration::from_secs(timeout_secs))),
        )
        .with_state(state)
}

/// Timeouts get the same JSON envelope as handler errors.
fn request_failed(err: BoxError, timeout_secs: u64) -> PanelError {
    if err.is::<tower::timeout::error::Elapsed>() {
        warn!("Request exceeded {}s and was cancelled", timeout_secs);
        PanelError::Timeout(timeout_secs)
    } else {
        PanelError::Io(std::io::Error::other(err.to_string()))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
