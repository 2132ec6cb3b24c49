// bitnet-panel/crates/bitnet-panel/src/lib.rs

pub mod acquisition;
pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model_runtime;
pub mod model_store;
pub mod server;
pub mod shared_state;
pub mod telemetry;
pub mod toolchain;

pub use config::Config;
pub use error::{PanelError, PanelResult};
pub use server::{build_router, run_server};
pub use shared_state::PanelState;
