//! Manifest loading: `envoke.toml` into environment descriptors.
//!
//! Each `[env.<name>]` table describes one environment. A command is either
//! a single line, split on whitespace with a leading `-` marking its exit
//! code as ignored, or a structured table:
//!
//! ```toml
//! [env.py]
//! depends_on = ["lint"]
//! commands = [
//!     "- pytest -x",
//!     { cmd = ["sh", "-c", "echo done"], stdin = "api" },
//! ]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;

use envoke_core::{CommandSpec, ConfigError, EnvDescriptor, StdinSource};

/// Default directory (relative to the manifest) holding env workspaces.
const WORK_ROOT: &str = ".envoke";

/// Parsed manifest plus the default selection order.
#[derive(Debug)]
pub struct Manifest {
    /// Every environment, in file order.
    pub envs: Vec<EnvDescriptor>,
    /// Default selection: the explicit `env_list`, or every env in file order.
    pub default_selection: Vec<String>,
    /// Manifest-level skip-missing-interpreters default.
    pub skip_missing_interpreters: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    #[serde(default)]
    env_list: Vec<String>,
    #[serde(default)]
    skip_missing_interpreters: bool,
    #[serde(default)]
    env: IndexMap<String, EnvTable>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnvTable {
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    setup: Vec<CommandEntry>,
    #[serde(default)]
    commands: Vec<CommandEntry>,
    #[serde(default = "default_true")]
    active: bool,
    #[serde(default)]
    parallel_show_output: bool,
    #[serde(default)]
    working_dir: Option<PathBuf>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    interpreter: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CommandEntry {
    Line(String),
    Full {
        cmd: Vec<String>,
        #[serde(default)]
        ignore_exit_code: bool,
        #[serde(default)]
        stdin: StdinSource,
    },
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let file: ManifestFile = toml::from_str(&text)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))?;
        let base = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        Self::from_file(file, &base)
    }

    fn from_file(file: ManifestFile, base: &Path) -> Result<Self> {
        let mut envs = Vec::new();
        for (name, table) in file.env {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyEnvName.into());
            }
            envs.push(build_env(&name, table, base)?);
        }

        for name in &file.env_list {
            if !envs.iter().any(|env| env.name == *name) {
                return Err(ConfigError::UnknownEnv(name.clone()).into());
            }
        }
        let default_selection = if file.env_list.is_empty() {
            envs.iter().map(|env| env.name.clone()).collect()
        } else {
            file.env_list
        };

        Ok(Self {
            envs,
            default_selection,
            skip_missing_interpreters: file.skip_missing_interpreters,
        })
    }

    /// Resolve the `-e` selector (or the default selection), keeping order
    /// and filtering inactive environments.
    pub fn select(&self, requested: &[String]) -> Result<Vec<String>, ConfigError> {
        let selection: Vec<String> = if requested.is_empty() {
            self.default_selection.clone()
        } else {
            for name in requested {
                if !self.envs.iter().any(|env| env.name == *name) {
                    return Err(ConfigError::UnknownEnv(name.clone()));
                }
            }
            requested.to_vec()
        };
        let mut seen = std::collections::HashSet::new();
        Ok(selection
            .into_iter()
            .filter(|name| {
                self.envs
                    .iter()
                    .any(|env| env.name == *name && env.active)
            })
            .filter(|name| seen.insert(name.clone()))
            .collect())
    }
}

fn build_env(name: &str, table: EnvTable, base: &Path) -> Result<EnvDescriptor> {
    let working_dir = match table.working_dir {
        Some(dir) if dir.is_absolute() => dir,
        Some(dir) => base.join(dir),
        None => base.join(WORK_ROOT).join(name),
    };
    let mut env = EnvDescriptor::new(name, working_dir);
    env.depends_on = table.depends_on.into_iter().collect();
    env.active = table.active;
    env.parallel_show_output = table.parallel_show_output;
    env.env_vars = table.env;
    env.interpreter = table.interpreter;
    if let Some(pattern) = table.platform {
        regex::Regex::new(&pattern).map_err(|_| ConfigError::InvalidPlatform {
            env: name.to_string(),
            pattern: pattern.clone(),
        })?;
        env.platform = Some(pattern);
    }
    env.setup = table
        .setup
        .into_iter()
        .map(|entry| parse_command(name, entry))
        .collect::<Result<_>>()?;
    env.commands = table
        .commands
        .into_iter()
        .map(|entry| parse_command(name, entry))
        .collect::<Result<_>>()?;
    Ok(env)
}

fn parse_command(env: &str, entry: CommandEntry) -> Result<CommandSpec> {
    match entry {
        CommandEntry::Line(line) => {
            let trimmed = line.trim();
            let (ignore, rest) = match trimmed.strip_prefix('-') {
                Some(rest) => (true, rest.trim_start()),
                None => (false, trimmed),
            };
            let argv: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
            if argv.is_empty() {
                return Err(ConfigError::EmptyCommand {
                    env: env.to_string(),
                }
                .into());
            }
            let mut spec = CommandSpec::new(argv);
            spec.ignore_exit_code = ignore;
            Ok(spec)
        }
        CommandEntry::Full {
            cmd,
            ignore_exit_code,
            stdin,
        } => {
            if cmd.is_empty() {
                return Err(ConfigError::EmptyCommand {
                    env: env.to_string(),
                }
                .into());
            }
            Ok(CommandSpec {
                argv: cmd,
                ignore_exit_code,
                stdin,
            })
        }
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
