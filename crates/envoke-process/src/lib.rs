//! Subprocess execution: requests, output drains, and the interrupt cascade.

pub mod drain;
pub mod interrupt;
pub mod local;
pub mod outcome;
pub mod request;

pub use drain::{ForwardTo, StreamDrain};
pub use interrupt::Interrupt;
pub use local::LocalExecutor;
pub use outcome::Outcome;
pub use request::ExecuteRequest;

use async_trait::async_trait;

/// Errors escaping a single command execution.
#[derive(thiserror::Error, Debug)]
pub enum ExecuteError {
    /// The run was interrupted while this command was in flight; carries the
    /// partial outcome of the command that received the cascade.
    #[error("command interrupted: {}", .0.shell_cmd())]
    Interrupted(Box<Outcome>),

    /// Waiting on the child failed at the OS level.
    #[error("failed waiting on child process: {0}")]
    Wait(#[from] std::io::Error),
}

/// Execution backend: drives one child process per call.
///
/// The local subprocess backend is [`LocalExecutor`]; test suites substitute
/// scripted doubles.
#[async_trait]
pub trait Execute: Send + Sync {
    /// Run one command to completion.
    ///
    /// `show` forwards the child's output to the terminal as it arrives.
    /// When `interrupt` trips while the child is alive, the cascade runs and
    /// the call resolves to [`ExecuteError::Interrupted`] carrying the
    /// partial [`Outcome`].
    async fn call(
        &self,
        request: ExecuteRequest,
        show: bool,
        interrupt: &Interrupt,
    ) -> Result<Outcome, ExecuteError>;
}
