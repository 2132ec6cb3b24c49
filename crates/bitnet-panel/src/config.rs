// bitnet-panel/crates/bitnet-panel/src/config.rs

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};

/// Quantization kernels accepted by BitNet's environment setup script.
pub const QUANT_TYPES: &[&str] = &["i2_s", "tl1"];

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub models_dir: PathBuf,
    pub static_dir: PathBuf,
    pub hub_endpoint: String,
    pub hub_token: Option<String>,
    pub hub_namespace: String,
    pub runner_program: String,
    pub runner_args: Vec<String>,
    pub setup_command: Vec<String>,
    pub quant_type: String,
    pub generate_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    pub progress_ttl_seconds: u64,
    pub max_upload_bytes: usize,
    pub default_model: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_host: "127.0.0.1".to_string(),
            api_port: 8000,
            models_dir: PathBuf::from("models"),
            static_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/static")),
            hub_endpoint: "https://huggingface.co".to_string(),
            hub_token: None,
            hub_namespace: "microsoft".to_string(),
            runner_program: "python3".to_string(),
            runner_args: vec!["run_inference.py".to_string()],
            setup_command: vec!["python3".to_string(), "setup_env.py".to_string()],
            quant_type: "i2_s".to_string(),
            generate_timeout_seconds: 300,
            request_timeout_seconds: 900,
            progress_ttl_seconds: 600,
            max_upload_bytes: 8 * 1024 * 1024 * 1024,
            default_model: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        let defaults = Self::default();

        let quant_type = env::var("QUANT_TYPE").unwrap_or(defaults.quant_type);
        if !QUANT_TYPES.contains(&quant_type.as_str()) {
            return Err(anyhow::anyhow!(
                "QUANT_TYPE must be one of {:?}, got '{}'",
                QUANT_TYPES,
                quant_type
            ));
        }

        let runner_program = env::var("BITNET_RUNNER").unwrap_or(defaults.runner_program);
        if runner_program.trim().is_empty() {
            return Err(anyhow::anyhow!("BITNET_RUNNER must not be empty"));
        }

        Ok(Self {
            api_host: env::var("API_HOST").unwrap_or(defaults.api_host),
            api_port: parse_env("API_PORT", defaults.api_port)?,
            models_dir: env::var("MODELS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.models_dir),
            static_dir: env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            hub_endpoint: env::var("HF_ENDPOINT")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.hub_endpoint),
            hub_token: env::var("HF_TOKEN").ok().filter(|t| !t.is_empty()),
            hub_namespace: env::var("HUB_NAMESPACE").unwrap_or(defaults.hub_namespace),
            runner_program,
            runner_args: env::var("BITNET_RUNNER_ARGS")
                .map(|s| split_command(&s))
                .unwrap_or(defaults.runner_args),
            setup_command: env::var("BITNET_SETUP_COMMAND")
                .map(|s| split_command(&s))
                .unwrap_or(defaults.setup_command),
            quant_type,
            generate_timeout_seconds: parse_env(
                "GENERATE_TIMEOUT_SECONDS",
                defaults.generate_timeout_seconds,
            )?,
            request_timeout_seconds: parse_env(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            )?,
            progress_ttl_seconds: parse_env("PROGRESS_TTL_SECONDS", defaults.progress_ttl_seconds)?,
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            default_model: env::var("DEFAULT_MODEL").ok().filter(|m| !m.is_empty()),
        })
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- API: {}:{}", self.api_host, self.api_port);
        info!("- Models Dir: {}", self.models_dir.display());
        info!("- Static Dir: {}", self.static_dir.display());
        info!("- Hub: {} (namespace: {})", self.hub_endpoint, self.hub_namespace);
        info!("- Native Runner: {} {}", self.runner_program, self.runner_args.join(" "));
        if self.setup_command.is_empty() {
            info!("- Setup Command: disabled");
        } else {
            info!("- Setup Command: {} (quant: {})", self.setup_command.join(" "), self.quant_type);
        }
        info!("- Generate Timeout: {}s", self.generate_timeout_seconds);
        info!("- Progress TTL: {}s", self.progress_ttl_seconds);
        info!("- Max Upload: {} MB", self.max_upload_bytes / 1024 / 1024);
        if let Some(model) = &self.default_model {
            info!("- Default Model: {}", model);
        }
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid API address {}:{}", self.api_host, self.api_port))
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

/// Whitespace-split a command line. An empty string yields an empty command.
fn split_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.api_port, 8000);
        assert_eq!(config.hub_namespace, "microsoft");
        assert_eq!(config.quant_type, "i2_s");
        assert_eq!(config.runner_args, vec!["run_inference.py"]);
        assert!(config.default_model.is_none());
    }

    #[test]
    fn test_api_addr_parsing() {
        let config = Config::default();
        let addr = config.api_addr().unwrap();

        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8000);
    }

    #[test]
    fn test_api_addr_with_zero_address() {
        let config = Config {
            api_host: "0.0.0.0".to_string(),
            api_port: 5000,
            ..Config::default()
        };

        let addr = config.api_addr().unwrap();
        assert_eq!(addr.port(), 5000);
        assert_eq!(addr.ip().to_string(), "0.0.0.0");
    }

    #[test]
    fn test_api_addr_rejects_hostnames() {
        let config = Config {
            api_host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(config.api_addr().is_err());
    }

    #[test]
    fn test_split_command() {
        assert_eq!(
            split_command("python3  setup_env.py"),
            vec!["python3".to_string(), "setup_env.py".to_string()]
        );
        assert!(split_command("   ").is_empty());
    }

    #[test]
    fn test_timeouts_are_positive() {
        let config = Config::default();
        assert!(config.generate_timeout_seconds > 0);
        assert!(config.request_timeout_seconds >= config.generate_timeout_seconds);
        assert!(config.progress_ttl_seconds > 0);
    }

    #[test]
    fn test_default_quant_type_is_supported() {
        assert!(QUANT_TYPES.contains(&Config::default().quant_type.as_str()));
    }
}
