//! Checks for the native build tools BitNet needs (cmake >= 3.22 and a
//! C/C++ compiler) and for the configured inference runner.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::TOOLCHAIN_HELP_URL;
use crate::model_runtime::NativeRunner;

pub const MIN_CMAKE_VERSION: (u32, u32) = (3, 22);

lazy_static! {
    static ref VERSION: Regex = Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").expect("valid regex");
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub name: String,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolchainReport {
    pub ready: bool,
    pub cmake: ToolStatus,
    pub compiler: ToolStatus,
    pub runner: ToolStatus,
    pub help_url: &'static str,
}

fn compiler_name() -> &'static str {
    if cfg!(windows) {
        "cl"
    } else {
        "clang"
    }
}

/// `(major, minor)` of the first version number in `text`.
pub fn parse_version(text: &str) -> Option<(u32, u32)> {
    let caps = VERSION.captures(text)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps.get(2)?.as_str().parse().ok()?;
    Some((major, minor))
}

async fn check_cmake() -> ToolStatus {
    let path = which::which("cmake").ok();
    let version = match &path {
        Some(path) => Command::new(path)
            .arg("--version")
            .output()
            .await
            .ok()
            .map(|out| String::from_utf8_lossy(&out.stdout).to_string())
            .and_then(|text| text.lines().next().map(|l| l.trim().to_string())),
        None => None,
    };
    let ok = version
        .as_deref()
        .and_then(parse_version)
        .map(|v| v >= MIN_CMAKE_VERSION)
        .unwrap_or(false);
    ToolStatus {
        name: "cmake".to_string(),
        path,
        version,
        ok,
    }
}

fn check_program(name: &str) -> ToolStatus {
    let path = which::which(name).ok();
    ToolStatus {
        name: name.to_string(),
        ok: path.is_some(),
        path,
        version: None,
    }
}

fn check_runner(runner: &NativeRunner) -> ToolStatus {
    ToolStatus {
        name: runner.program.clone(),
        path: which::which(&runner.program).ok(),
        version: None,
        ok: runner.is_available(),
    }
}

pub async fn inspect(runner: &NativeRunner) -> ToolchainReport {
    let cmake = check_cmake().await;
    let compiler = check_program(compiler_name());
    let runner = check_runner(runner);
    ToolchainReport {
        ready: cmake.ok && compiler.ok && runner.ok,
        cmake,
        compiler,
        runner,
        help_url: TOOLCHAIN_HELP_URL,
    }
}

/// Logs the report at startup. Missing tools only disable the native path.
pub fn log_report(report: &ToolchainReport) {
    if report.ready {
        info!("✅ Native toolchain ready");
        return;
    }
    for tool in [&report.cmake, &report.compiler, &report.runner] {
        if !tool.ok {
            match &tool.version {
                Some(version) => warn!(
                    "⚠️  {} is too old ({}); {}.{} or newer is required",
                    tool.name, version, MIN_CMAKE_VERSION.0, MIN_CMAKE_VERSION.1
                ),
                None => warn!("⚠️  {} not found", tool.name),
            }
        }
    }
    warn!("Native inference may be unavailable; see {}", report.help_url);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_cmake_version() {
        assert_eq!(parse_version("cmake version 3.22.1"), Some((3, 22)));
        assert_eq!(parse_version("cmake version 3.28.3-dirty"), Some((3, 28)));
        assert_eq!(parse_version("nothing here"), None);
        assert!(parse_version("cmake version 3.16.3").unwrap() < MIN_CMAKE_VERSION);
        assert!(parse_version("cmake version 4.0.0").unwrap() >= MIN_CMAKE_VERSION);
    }

    #[test]
    fn test_missing_runner_is_not_ready() {
        let runner = NativeRunner {
            program: "/nonexistent/bitnet-runner".to_string(),
            leading_args: Vec::new(),
            timeout: Duration::from_secs(1),
        };
        let report = tokio_test::block_on(inspect(&runner));
        assert!(!report.runner.ok);
        assert!(!report.ready);
        assert_eq!(report.help_url, TOOLCHAIN_HELP_URL);
    }

    #[test]
    fn test_shell_is_found() {
        assert!(check_program("sh").ok);
    }
}
