//! Structured result journal written by `--result-json`.
//!
//! Key names follow the legacy report schema consumed downstream; run ids
//! are stable strings such as `setup[0]` and `commands[1]`.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use crate::run_one::RunResult;

pub const REPORT_VERSION: &str = "1";

/// Identity and digest of a prebuilt package supplied via `--installpkg`.
#[derive(Debug, Clone)]
pub struct InstallPkg {
    pub basename: String,
    pub sha256: String,
}

impl InstallPkg {
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read install package {}", path.display()))?;
        let digest = Sha256::digest(&bytes);
        let sha256 = digest.iter().map(|byte| format!("{byte:02x}")).collect();
        let basename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { basename, sha256 })
    }

    fn to_value(&self) -> Value {
        json!({
            "basename": self.basename,
            "type": "file",
            "sha256": self.sha256,
        })
    }
}

/// Write the run journal to `path`.
pub fn write_journal(
    path: &Path,
    results: &[RunResult],
    install_pkg: Option<&InstallPkg>,
) -> Result<()> {
    let text = serde_json::to_string_pretty(&journal_value(results, install_pkg))
        .context("Failed to serialize result journal")?;
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write result journal {}", path.display()))
}

fn journal_value(results: &[RunResult], install_pkg: Option<&InstallPkg>) -> Value {
    let mut testenvs = Map::new();
    for run in results {
        testenvs.insert(run.name.clone(), env_entry(run, install_pkg));
    }
    json!({
        "reportversion": REPORT_VERSION,
        "toxversion": env!("CARGO_PKG_VERSION"),
        "platform": std::env::consts::OS,
        "host": host_info(),
        "testenvs": testenvs,
    })
}

fn env_entry(run: &RunResult, install_pkg: Option<&InstallPkg>) -> Value {
    let mut setup = Vec::new();
    let mut test = Vec::new();
    for outcome in &run.outcomes {
        let entry = json!({
            "retcode": outcome.exit_code,
            "run_id": outcome.request.run_id,
        });
        if outcome.request.run_id.starts_with("setup") {
            setup.push(entry);
        } else {
            test.push(entry);
        }
    }

    let mut entry = Map::new();
    entry.insert("setup".to_string(), Value::Array(setup));
    entry.insert("test".to_string(), Value::Array(test));
    entry.insert("installed_packages".to_string(), json!([]));
    if let Some(pkg) = install_pkg {
        entry.insert("installpkg".to_string(), pkg.to_value());
    }
    Value::Object(entry)
}

fn host_info() -> Value {
    json!({
        "hostname": sysinfo::System::host_name(),
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "reported_at": chrono::Utc::now().to_rfc3339(),
    })
}
