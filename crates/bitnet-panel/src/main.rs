// bitnet-panel/crates/bitnet-panel/src/main.rs

#[cfg(feature = "cli")]
use bitnet_panel::{config::Config, run_server};
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use dotenvy::dotenv;

/// Web control panel for BitNet models.
#[cfg(feature = "cli")]
#[derive(Debug, Parser)]
#[command(name = "bitnet-panel", version, about)]
struct Args {
    /// Address to bind (overrides API_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides API_PORT)
    #[arg(long, short)]
    port: Option<u16>,

    /// Model store directory (overrides MODELS_DIR)
    #[arg(long)]
    models_dir: Option<std::path::PathBuf>,
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let mut cfg = Config::from_env()?;
    if let Some(host) = args.host {
        cfg.api_host = host;
    }
    if let Some(port) = args.port {
        cfg.api_port = port;
    }
    if let Some(models_dir) = args.models_dir {
        cfg.models_dir = models_dir;
    }

    run_server(cfg).await
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
