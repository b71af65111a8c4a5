use std::fmt;
use std::time::{Duration, Instant};

use crate::request::ExecuteRequest;

/// The recorded result of one command.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// The request that produced this outcome.
    pub request: ExecuteRequest,
    /// Exit code of the child; `None` when it was never set. Signal deaths
    /// map to the negated signal number.
    pub exit_code: Option<i32>,
    /// Decoded stdout capture, bytes in arrival order.
    pub out: String,
    /// Decoded stderr capture, bytes in arrival order.
    pub err: String,
    pub start: Instant,
    pub end: Instant,
    /// Argv after executable resolution; the original argv when resolution
    /// failed or the spawn never happened.
    pub cmd: Vec<String>,
}

impl Outcome {
    pub const OK: i32 = 0;

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request: ExecuteRequest,
        exit_code: Option<i32>,
        out: String,
        err: String,
        start: Instant,
        end: Instant,
        cmd: Vec<String>,
    ) -> Self {
        Self {
            request,
            exit_code,
            out,
            err,
            start,
            end,
            cmd,
        }
    }

    /// An outcome for a child that failed to spawn: the OS error code, empty
    /// captures, and the original argv.
    pub(crate) fn spawn_failed(request: ExecuteRequest, code: i32, start: Instant) -> Self {
        let cmd = request.cmd.clone();
        Self::new(
            request,
            Some(code),
            String::new(),
            String::new(),
            start,
            Instant::now(),
            cmd,
        )
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(Self::OK)
    }

    pub fn elapsed(&self) -> Duration {
        self.end.duration_since(self.start)
    }

    pub fn shell_cmd(&self) -> String {
        self.cmd.join(" ")
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(
                f,
                "exit {code} in {:.2} seconds for {}",
                self.elapsed().as_secs_f64(),
                self.shell_cmd()
            ),
            None => write!(f, "exit unset for {}", self.shell_cmd()),
        }
    }
}
