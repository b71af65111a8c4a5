use std::collections::HashMap;
use std::path::PathBuf;

use envoke_core::StdinSource;

/// Fully-resolved instruction to run one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteRequest {
    /// Program and arguments as configured; never empty.
    pub cmd: Vec<String>,
    /// Working directory for the child.
    pub cwd: PathBuf,
    /// Complete environment snapshot for the child. `PATH` from this map
    /// drives executable resolution.
    pub env: HashMap<String, String>,
    pub stdin: StdinSource,
    /// Bytes fed to a piped stdin before it is closed; only meaningful for
    /// [`StdinSource::Api`].
    pub stdin_bytes: Option<Vec<u8>>,
    /// Journal identifier for this command, e.g. `commands[0]`.
    pub run_id: String,
}

impl ExecuteRequest {
    pub fn new(
        cmd: Vec<String>,
        cwd: impl Into<PathBuf>,
        env: HashMap<String, String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            cmd,
            cwd: cwd.into(),
            env,
            stdin: StdinSource::Off,
            stdin_bytes: None,
            run_id: run_id.into(),
        }
    }

    /// Human-readable single-line rendering of the command.
    pub fn shell_cmd(&self) -> String {
        self.cmd.join(" ")
    }
}
