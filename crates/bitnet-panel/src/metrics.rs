use axum::http::StatusCode;
use axum::response::IntoResponse;
use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::OnceLock;
use tracing::warn;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}
static REQ_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
static ACTIVE_DOWNLOADS: OnceLock<IntGauge> = OnceLock::new();
static GENERATION_TIME: OnceLock<HistogramVec> = OnceLock::new();

pub fn init_metrics() {
    let req_counter = REQ_COUNTER.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("requests_total", "Total requests per route"),
            &["route", "status"],
        )
        .expect("static metric definition")
    });

    let active_downloads = ACTIVE_DOWNLOADS.get_or_init(|| {
        IntGauge::new("downloads_active", "Model downloads currently in flight")
            .expect("static metric definition")
    });

    let generation_time = GENERATION_TIME.get_or_init(|| {
        HistogramVec::new(
            prometheus::HistogramOpts::new("generation_seconds", "Wall time per generation")
                .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
            &["backend"],
        )
        .expect("static metric definition")
    });

    REGISTRY.register(Box::new(req_counter.clone())).ok();
    REGISTRY.register(Box::new(active_downloads.clone())).ok();
    REGISTRY.register(Box::new(generation_time.clone())).ok();
}

pub fn inc_request(route: &str, status: &str) {
    if let Some(counter) = REQ_COUNTER.get() {
        counter.with_label_values(&[route, status]).inc();
    }
}

pub fn inc_downloads() {
    if let Some(gauge) = ACTIVE_DOWNLOADS.get() {
        gauge.inc();
    }
}

pub fn dec_downloads() {
    if let Some(gauge) = ACTIVE_DOWNLOADS.get() {
        gauge.dec();
    }
}

pub fn observe_generation(backend: &str, seconds: f64) {
    if let Some(histogram) = GENERATION_TIME.get() {
        histogram.with_label_values(&[backend]).observe(seconds);
    }
}

pub async fn get_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; version=0.0.4")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
}
