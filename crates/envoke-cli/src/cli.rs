use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Parallel test-environment runner.
#[derive(Parser, Debug)]
#[command(
    name = "envoke",
    version,
    about = "Run isolated command environments honoring their dependency graph"
)]
pub struct Cli {
    /// Manifest path
    #[arg(short = 'c', long = "conf", value_name = "PATH", default_value = "envoke.toml")]
    pub conf: PathBuf,

    /// Comma-separated list of environments to run (defaults to the manifest selection)
    #[arg(short = 'e', long = "envs", value_name = "ENV_LIST", value_delimiter = ',')]
    pub env_list: Vec<String>,

    /// Run environments in parallel with up to N workers ("all" lifts the cap)
    #[arg(
        short = 'p',
        long = "parallel",
        value_name = "N|all",
        num_args = 0..=1,
        default_missing_value = "all"
    )]
    pub parallel: Option<Parallel>,

    /// Show output of parallel runs as it arrives instead of capturing it
    #[arg(long = "parallel-live")]
    pub parallel_live: bool,

    /// Write a json file with detailed information about all commands and results involved
    #[arg(long = "result-json", value_name = "PATH")]
    pub result_json: Option<PathBuf>,

    /// Don't fail environments whose interpreter is missing: {config,true,false}
    #[arg(
        short = 's',
        long = "skip-missing-interpreters",
        value_name = "v",
        num_args = 0..=1,
        default_missing_value = "true",
        default_value = "config"
    )]
    pub skip_missing_interpreters: SkipMissing,

    /// Do not run the test commands
    #[arg(short = 'n', long = "notest")]
    pub no_test: bool,

    /// Only perform the packaging activity
    #[arg(short = 'b', long = "pkg-only")]
    pub pkg_only: bool,

    /// Use the given prebuilt package instead of building one
    #[arg(long = "installpkg", value_name = "PATH")]
    pub install_pkg: Option<PathBuf>,

    /// Recreate environment working directories from scratch
    #[arg(short = 'r', long = "recreate")]
    pub recreate: bool,

    /// Increase verbosity (repeatable)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Decrease verbosity (repeatable)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    /// Effective verbosity; the default sits at 2.
    pub fn verbosity(&self) -> u8 {
        (2 + self.verbose).saturating_sub(self.quiet)
    }
}

/// Worker cap for parallel mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallel {
    /// One worker per selected environment.
    All,
    Limit(usize),
}

impl std::str::FromStr for Parallel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "all" {
            return Ok(Self::All);
        }
        match value.parse::<usize>() {
            Ok(0) => Err("worker count must be positive".to_string()),
            Ok(n) => Ok(Self::Limit(n)),
            Err(_) => Err(format!("expected a worker count or 'all', got '{value}'")),
        }
    }
}

/// How a missing interpreter is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum SkipMissing {
    /// Defer to the manifest.
    Config,
    True,
    False,
}
