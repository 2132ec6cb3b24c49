//! Post-download environment setup (`setup_env.py --model-dir .. --quant-type ..`).

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    Disabled,
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct EnvironmentSetup {
    command: Vec<String>,
    quant_type: String,
}

impl EnvironmentSetup {
    /// An empty `command` disables the step.
    pub fn new(command: Vec<String>, quant_type: impl Into<String>) -> Self {
        Self {
            command,
            quant_type: quant_type.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.command.is_empty()
    }

    pub fn build_args(&self, model_dir: &Path) -> Vec<String> {
        let mut args: Vec<String> = self.command.iter().skip(1).cloned().collect();
        args.extend([
            "--model-dir".to_string(),
            model_dir.to_string_lossy().to_string(),
            "--quant-type".to_string(),
            self.quant_type.clone(),
        ]);
        args
    }

    /// Never fails the download: problems are logged and reported back.
    pub async fn run(&self, model_dir: &Path) -> SetupOutcome {
        let Some(program) = self.command.first() else {
            return SetupOutcome::Disabled;
        };
        let args = self.build_args(model_dir);
        info!("Running environment setup: {} {:?}", program, args);

        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => SetupOutcome::Succeeded,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                warn!(
                    "Environment setup exited with {}; the fallback path remains available: {}",
                    output.status, stderr
                );
                SetupOutcome::Failed(stderr)
            }
            Err(e) => {
                warn!("Could not start environment setup '{}': {}", program, e);
                SetupOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_args() {
        let setup = EnvironmentSetup::new(
            vec!["python3".into(), "setup_env.py".into()],
            "i2_s",
        );
        assert_eq!(
            setup.build_args(Path::new("models/bitnet")),
            vec!["setup_env.py", "--model-dir", "models/bitnet", "--quant-type", "i2_s"]
        );
    }

    #[tokio::test]
    async fn test_disabled_setup() {
        let setup = EnvironmentSetup::new(Vec::new(), "i2_s");
        assert!(!setup.is_enabled());
        assert_eq!(setup.run(Path::new("/tmp")).await, SetupOutcome::Disabled);
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_raised() {
        let setup = EnvironmentSetup::new(vec!["sh".into(), "-c".into(), "exit 3".into()], "tl1");
        assert!(matches!(setup.run(Path::new("/tmp")).await, SetupOutcome::Failed(_)));

        let missing = EnvironmentSetup::new(vec!["/nonexistent/setup-tool".into()], "i2_s");
        assert!(matches!(missing.run(Path::new("/tmp")).await, SetupOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_success() {
        let setup = EnvironmentSetup::new(vec!["sh".into(), "-c".into(), "exit 0".into()], "i2_s");
        assert_eq!(setup.run(Path::new("/tmp")).await, SetupOutcome::Succeeded);
    }
}
