// bitnet-panel/crates/bitnet-panel/src/telemetry.rs

use tracing_subscriber::{fmt, EnvFilter};

/// Panel logs at info; hub transfers, tokenizer and request-level chatter
/// stay quiet unless `RUST_LOG` asks for them.
pub const DEFAULT_FILTER: &str =
    "info,bitnet_panel=info,tower_http=warn,hyper=warn,reqwest=warn,tokenizers=warn,candle_core=warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .compact()
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        tracing::debug!("Tracing initialised");
    }
}
