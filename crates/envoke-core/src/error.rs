use std::path::PathBuf;

/// Configuration faults surfaced before any environment runs.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Environment name cannot be empty")]
    EmptyEnvName,

    #[error("Unknown environment '{0}'")]
    UnknownEnv(String),

    #[error("Dependency cycle detected involving environment '{0}'")]
    DependencyCycle(String),

    #[error("Environment '{env}' has an invalid platform pattern '{pattern}'")]
    InvalidPlatform { env: String, pattern: String },

    #[error("Environment '{env}' has a command with an empty argv")]
    EmptyCommand { env: String },

    #[error("Install package {0} does not exist")]
    MissingInstallPackage(PathBuf),

    #[error("Install package {0} is not a file")]
    InvalidInstallPackage(PathBuf),
}
