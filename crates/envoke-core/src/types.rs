use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where a command's stdin comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdinSource {
    /// Closed immediately; the child sees EOF.
    #[default]
    Off,
    /// Inherited from the invoking terminal.
    User,
    /// A writable pipe fed with caller-supplied bytes, then closed.
    Api,
}

/// One invocation of an external program within an environment's sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program and arguments; never empty.
    pub argv: Vec<String>,
    /// When true a non-zero exit does not fail the environment.
    pub ignore_exit_code: bool,
    pub stdin: StdinSource,
}

impl CommandSpec {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            ignore_exit_code: false,
            stdin: StdinSource::Off,
        }
    }
}

/// A named, isolated workspace: its dependencies and the commands to run
/// inside it. Immutable once scheduling begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvDescriptor {
    /// Unique non-empty token.
    pub name: String,
    /// Names that must produce a result before this environment starts.
    /// Names outside the scheduled universe are dropped at scheduling time.
    pub depends_on: BTreeSet<String>,
    /// Preparation commands; a failure here skips the test commands.
    pub setup: Vec<CommandSpec>,
    /// Test commands, executed strictly in order.
    pub commands: Vec<CommandSpec>,
    /// Inactive environments are filtered before scheduling.
    pub active: bool,
    /// Flush captured output on completion even when the environment passed.
    pub parallel_show_output: bool,
    /// Workspace directory; created (or recreated) during setup.
    pub working_dir: PathBuf,
    /// Extra variables layered over the process environment snapshot.
    pub env_vars: BTreeMap<String, String>,
    /// Optional regex matched against the host OS token; a mismatch is an
    /// intentional skip.
    pub platform: Option<String>,
    /// Optional executable probed on PATH during setup; a miss is classified
    /// by the skip-missing-interpreters setting.
    pub interpreter: Option<String>,
}

impl EnvDescriptor {
    pub fn new(name: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            depends_on: BTreeSet::new(),
            setup: Vec::new(),
            commands: Vec::new(),
            active: true,
            parallel_show_output: false,
            working_dir: working_dir.into(),
            env_vars: BTreeMap::new(),
            platform: None,
            interpreter: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdin_source_wire_names() {
        assert_eq!(
            serde_json::to_string(&StdinSource::Api).unwrap(),
            "\"api\""
        );
        let parsed: StdinSource = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(parsed, StdinSource::User);
    }

    #[test]
    fn stdin_source_defaults_to_off() {
        assert_eq!(StdinSource::default(), StdinSource::Off);
    }

    #[test]
    fn command_spec_new_is_strict() {
        let spec = CommandSpec::new(vec!["true".into()]);
        assert!(!spec.ignore_exit_code);
        assert_eq!(spec.stdin, StdinSource::Off);
    }

    #[test]
    fn descriptor_new_is_active() {
        let env = EnvDescriptor::new("py", "/tmp/py");
        assert!(env.active);
        assert!(env.depends_on.is_empty());
        assert!(env.commands.is_empty());
    }
}
