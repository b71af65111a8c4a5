//! Scripted executor double for runner and driver tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use envoke_process::{Execute, ExecuteError, ExecuteRequest, Interrupt, Outcome};

/// Behavior keyed by argv[0].
#[derive(Debug, Clone)]
pub struct Script {
    pub exit_code: i32,
    pub out: String,
    pub err: String,
    pub delay: Duration,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            exit_code: 0,
            out: String::new(),
            err: String::new(),
            delay: Duration::ZERO,
        }
    }
}

impl Script {
    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Self::default()
        }
    }

    pub fn sleeping(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

/// Executor double replaying scripted results. Unknown commands succeed
/// instantly with empty output. Interrupted waits resolve to the
/// distinguished interrupted error with exit code -2, like a child dying on
/// the soft interrupt.
#[derive(Debug, Default)]
pub struct FakeExecutor {
    scripts: HashMap<String, Script>,
    /// argv[0] of every call, in start order.
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, program: &str, script: Script) -> Self {
        self.scripts.insert(program.to_string(), script);
        self
    }

    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Execute for FakeExecutor {
    async fn call(
        &self,
        request: ExecuteRequest,
        _show: bool,
        interrupt: &Interrupt,
    ) -> Result<Outcome, ExecuteError> {
        let start = Instant::now();
        self.calls.lock().unwrap().push(request.cmd[0].clone());
        let script = self.scripts.get(&request.cmd[0]).cloned().unwrap_or_default();

        let mut interrupted = false;
        if script.delay > Duration::ZERO {
            tokio::select! {
                _ = tokio::time::sleep(script.delay) => {}
                _ = interrupt.notified() => interrupted = true,
            }
        }

        let cmd = request.cmd.clone();
        if interrupted {
            let outcome = Outcome::new(
                request,
                Some(-2),
                script.out,
                script.err,
                start,
                Instant::now(),
                cmd,
            );
            return Err(ExecuteError::Interrupted(Box::new(outcome)));
        }
        Ok(Outcome::new(
            request,
            Some(script.exit_code),
            script.out,
            script.err,
            start,
            Instant::now(),
            cmd,
        ))
    }
}
