//! Local subprocess execution backend with the three-stage interrupt cascade.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use envoke_core::StdinSource;

use crate::drain::{ForwardTo, StreamDrain};
use crate::interrupt::Interrupt;
use crate::outcome::Outcome;
use crate::request::ExecuteRequest;
use crate::{Execute, ExecuteError};

/// Wait budget after the soft interrupt before escalating to terminate.
pub const WAIT_INTERRUPT: Duration = Duration::from_millis(300);
/// Wait budget after terminate before the final kill.
pub const WAIT_TERMINATE: Duration = Duration::from_millis(200);

const STDIN_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Executor spawning children on the local machine.
#[derive(Debug, Clone, Copy)]
pub struct LocalExecutor {
    colored: bool,
}

impl LocalExecutor {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }
}

#[async_trait]
impl Execute for LocalExecutor {
    async fn call(
        &self,
        request: ExecuteRequest,
        show: bool,
        interrupt: &Interrupt,
    ) -> Result<Outcome, ExecuteError> {
        let start = Instant::now();
        let cmd = resolve_cmd(&request);

        let mut child = match spawn_child(&request, &cmd) {
            Ok(child) => child,
            Err(err) => {
                let code = err.raw_os_error().unwrap_or(1);
                warn!(cmd = %request.shell_cmd(), error = %err, "failed to spawn command");
                return Ok(Outcome::spawn_failed(request, code, start));
            }
        };
        debug!(pid = child.id(), cmd = %request.shell_cmd(), "spawned command");

        feed_stdin(&mut child, &request);

        let out_forward = if show { ForwardTo::Stdout } else { ForwardTo::Null };
        let err_forward = if show {
            ForwardTo::Stderr { red: self.colored }
        } else {
            ForwardTo::Null
        };
        let out_drain = child
            .stdout
            .take()
            .map(|pipe| StreamDrain::spawn(pipe, out_forward, true));
        let err_drain = child
            .stderr
            .take()
            .map(|pipe| StreamDrain::spawn(pipe, err_forward, true));

        let mut natural_exit = None;
        tokio::select! {
            status = child.wait() => natural_exit = Some(status),
            _ = interrupt.notified() => {}
        }
        let (wait_result, interrupted) = match natural_exit {
            Some(status) => (status, false),
            None => (interrupt_cascade(&mut child).await, true),
        };

        let out = match out_drain {
            Some(drain) => drain.shutdown().await,
            None => Vec::new(),
        };
        let err = match err_drain {
            Some(drain) => drain.shutdown().await,
            None => Vec::new(),
        };

        let status = wait_result?;
        let end = Instant::now();
        let outcome = Outcome::new(
            request,
            exit_code_of(&status),
            String::from_utf8_lossy(&out).into_owned(),
            String::from_utf8_lossy(&err).into_owned(),
            start,
            end,
            cmd,
        );
        if interrupted {
            Err(ExecuteError::Interrupted(Box::new(outcome)))
        } else {
            Ok(outcome)
        }
    }
}

/// Substitute an absolute executable path resolved via the request's `PATH`;
/// an unresolved name is passed through untouched.
fn resolve_cmd(request: &ExecuteRequest) -> Vec<String> {
    let mut cmd = request.cmd.clone();
    if let Some(first) = cmd.first_mut() {
        if let Ok(found) = which::which_in(&*first, request.env.get("PATH"), &request.cwd) {
            *first = found.to_string_lossy().into_owned();
        }
    }
    cmd
}

fn spawn_child(request: &ExecuteRequest, cmd: &[String]) -> std::io::Result<Child> {
    let mut command = Command::new(&cmd[0]);
    command
        .args(&cmd[1..])
        .current_dir(&request.cwd)
        .env_clear()
        .envs(&request.env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(match request.stdin {
            StdinSource::User => Stdio::inherit(),
            StdinSource::Api => Stdio::piped(),
            StdinSource::Off => Stdio::null(),
        })
        .kill_on_drop(true);

    // Children get their own process group so cascade signals reach their
    // descendants.
    // SAFETY: setsid() is async-signal-safe and runs before exec.
    #[cfg(unix)]
    unsafe {
        command.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }
    #[cfg(windows)]
    command.creation_flags(CREATE_NEW_PROCESS_GROUP);

    command.spawn()
}

/// Write the request's stdin bytes on a background task, then close the pipe.
/// A request without bytes has its pipe closed immediately.
fn feed_stdin(child: &mut Child, request: &ExecuteRequest) {
    let Some(mut stdin) = child.stdin.take() else {
        return;
    };
    let Some(data) = request.stdin_bytes.clone() else {
        return; // dropping the handle closes the pipe
    };
    tokio::spawn(async move {
        match timeout(STDIN_WRITE_TIMEOUT, async {
            stdin.write_all(&data).await?;
            stdin.shutdown().await?;
            Ok::<_, std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("stdin write error: {e}"),
            Err(_) => warn!(
                timeout_secs = STDIN_WRITE_TIMEOUT.as_secs(),
                "stdin write timed out"
            ),
        }
    });
}

/// INT -> TERM -> KILL against the child's process group, with bounded waits
/// between stages. The drains keep pulling output throughout. A child that
/// is already dead is reaped and its status returned unchanged.
#[cfg(unix)]
async fn interrupt_cascade(child: &mut Child) -> std::io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }
    warn!(pid = child.id(), "interrupt: SIGINT to process group");
    signal_group(child, libc::SIGINT);
    if let Ok(status) = timeout(WAIT_INTERRUPT, child.wait()).await {
        return status;
    }
    warn!(pid = child.id(), "interrupt: SIGTERM to process group");
    signal_group(child, libc::SIGTERM);
    if let Ok(status) = timeout(WAIT_TERMINATE, child.wait()).await {
        return status;
    }
    info!(pid = child.id(), "interrupt: SIGKILL to process group");
    signal_group(child, libc::SIGKILL);
    child.wait().await
}

#[cfg(not(unix))]
async fn interrupt_cascade(child: &mut Child) -> std::io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }
    child.start_kill()?;
    child.wait().await
}

#[cfg(unix)]
fn signal_group(child: &Child, sig: i32) {
    if let Some(pid) = child.id() {
        // SAFETY: kill() is async-signal-safe; negative PID targets the group.
        unsafe {
            libc::kill(-(pid as i32), sig);
        }
    }
}

/// Exit code of a reaped child; signal deaths map to the negated signal
/// number.
fn exit_code_of(status: &ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.code().or_else(|| status.signal().map(|sig| -sig))
    }
    #[cfg(not(unix))]
    status.code()
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
