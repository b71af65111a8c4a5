//! Shared value types and the configuration-error taxonomy.

pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::{CommandSpec, EnvDescriptor, StdinSource};
