//! Per-environment runner: setup, command sequence, aggregate result.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use envoke_core::{CommandSpec, EnvDescriptor};
use envoke_process::{Execute, ExecuteError, ExecuteRequest, Interrupt, Outcome};

/// Sentinel for environments interrupted before dispatch.
pub const CODE_INTERRUPTED: i32 = -2;
/// Sentinel for workers cancelled in flight.
pub const CODE_CANCELLED: i32 = -3;
/// Duration recorded on synthesized results.
pub const MISS_DURATION: Duration = Duration::ZERO;

/// Aggregate outcome for one environment.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub name: String,
    /// Set when setup declined intentionally or the commands were not asked
    /// to run; pairs with `code == 0`.
    pub skipped: bool,
    pub code: i32,
    /// Setup outcomes first, then test commands, in execution order.
    pub outcomes: Vec<Outcome>,
    /// Wall time for the whole environment, including setup gaps.
    pub duration: Duration,
}

impl RunResult {
    pub fn is_ok(&self) -> bool {
        self.code == Outcome::OK
    }

    /// Result fabricated by the driver for an environment that never ran.
    pub fn synthesized(name: impl Into<String>, code: i32) -> Self {
        Self {
            name: name.into(),
            skipped: false,
            code,
            outcomes: Vec::new(),
            duration: MISS_DURATION,
        }
    }
}

/// Flags applying to every environment in the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Wipe and recreate working directories before setup.
    pub recreate: bool,
    /// Setup only; the test commands are not executed.
    pub no_test: bool,
    /// Packaging only; environments are not prepared or run at all.
    pub pkg_only: bool,
    /// Resolved skip-missing-interpreters decision.
    pub skip_missing: bool,
    /// Forward command output to the terminal as it arrives.
    pub live: bool,
}

enum Setup {
    Ready,
    Skip(String),
    Failed(i32),
    Interrupted(i32),
}

/// Run one environment to completion: setup steps, then each test command in
/// order, stopping at the first failure whose exit code is not ignored.
pub async fn run_one(
    env: &EnvDescriptor,
    executor: &dyn Execute,
    opts: RunOptions,
    interrupt: &Interrupt,
) -> RunResult {
    let start = Instant::now();
    let show = opts.live || env.parallel_show_output;
    let mut outcomes = Vec::new();

    if opts.pkg_only {
        debug!(env = %env.name, "packaging-only run; environment skipped");
        return result(env, true, Outcome::OK, outcomes, start);
    }

    match setup_env(env, executor, opts, interrupt, show, &mut outcomes).await {
        Setup::Ready => {}
        Setup::Skip(reason) => {
            debug!(env = %env.name, reason, "environment skipped");
            return result(env, true, Outcome::OK, outcomes, start);
        }
        Setup::Failed(code) | Setup::Interrupted(code) => {
            return result(env, false, code, outcomes, start);
        }
    }

    if opts.no_test {
        debug!(env = %env.name, "test commands skipped");
        return result(env, true, Outcome::OK, outcomes, start);
    }

    let mut code = Outcome::OK;
    for (index, spec) in env.commands.iter().enumerate() {
        if interrupt.is_set() {
            code = CODE_INTERRUPTED;
            break;
        }
        let request = build_request(env, spec, format!("commands[{index}]"));
        match executor.call(request, show, interrupt).await {
            Ok(outcome) => {
                let failed = !outcome.success();
                let exit = outcome.exit_code.unwrap_or(1);
                outcomes.push(outcome);
                if failed && !spec.ignore_exit_code {
                    code = exit;
                    break;
                }
            }
            Err(ExecuteError::Interrupted(outcome)) => {
                code = outcome.exit_code.unwrap_or(CODE_INTERRUPTED);
                outcomes.push(*outcome);
                break;
            }
            Err(err) => {
                error!(env = %env.name, error = %err, "command execution failed");
                code = 1;
                break;
            }
        }
    }

    result(env, false, code, outcomes, start)
}

fn result(
    env: &EnvDescriptor,
    skipped: bool,
    code: i32,
    outcomes: Vec<Outcome>,
    start: Instant,
) -> RunResult {
    RunResult {
        name: env.name.clone(),
        skipped,
        code,
        outcomes,
        duration: start.elapsed(),
    }
}

/// Prepare the environment: working directory, platform filter, interpreter
/// probe, then the configured setup commands.
async fn setup_env(
    env: &EnvDescriptor,
    executor: &dyn Execute,
    opts: RunOptions,
    interrupt: &Interrupt,
    show: bool,
    outcomes: &mut Vec<Outcome>,
) -> Setup {
    if let Err(err) = prepare_workdir(env, opts.recreate) {
        error!(env = %env.name, error = %err, "failed to prepare working directory");
        return Setup::Failed(1);
    }

    if let Some(pattern) = &env.platform {
        // pattern validity is enforced at manifest load
        let matches = regex::Regex::new(pattern)
            .map(|re| re.is_match(std::env::consts::OS))
            .unwrap_or(false);
        if !matches {
            return Setup::Skip(format!("platform mismatch ({})", std::env::consts::OS));
        }
    }

    if let Some(interpreter) = &env.interpreter {
        let vars = env_snapshot(env);
        if which::which_in(interpreter, vars.get("PATH"), &env.working_dir).is_err() {
            if opts.skip_missing {
                return Setup::Skip(format!("interpreter '{interpreter}' not found"));
            }
            warn!(env = %env.name, interpreter, "interpreter not found");
            return Setup::Failed(1);
        }
    }

    for (index, spec) in env.setup.iter().enumerate() {
        if interrupt.is_set() {
            return Setup::Interrupted(CODE_INTERRUPTED);
        }
        let request = build_request(env, spec, format!("setup[{index}]"));
        match executor.call(request, show, interrupt).await {
            Ok(outcome) => {
                let failed = !outcome.success();
                let exit = outcome.exit_code.unwrap_or(1);
                outcomes.push(outcome);
                if failed && !spec.ignore_exit_code {
                    return Setup::Failed(exit);
                }
            }
            Err(ExecuteError::Interrupted(outcome)) => {
                let exit = outcome.exit_code.unwrap_or(CODE_INTERRUPTED);
                outcomes.push(*outcome);
                return Setup::Interrupted(exit);
            }
            Err(err) => {
                error!(env = %env.name, error = %err, "setup command failed to run");
                return Setup::Failed(1);
            }
        }
    }
    Setup::Ready
}

fn prepare_workdir(env: &EnvDescriptor, recreate: bool) -> std::io::Result<()> {
    if recreate && env.working_dir.exists() {
        std::fs::remove_dir_all(&env.working_dir)?;
    }
    std::fs::create_dir_all(&env.working_dir)
}

/// The process environment with the env's own variables layered on top.
fn env_snapshot(env: &EnvDescriptor) -> HashMap<String, String> {
    let mut vars: HashMap<String, String> = std::env::vars().collect();
    for (key, value) in &env.env_vars {
        vars.insert(key.clone(), value.clone());
    }
    vars
}

pub(crate) fn build_request(env: &EnvDescriptor, spec: &CommandSpec, run_id: String) -> ExecuteRequest {
    let mut request = ExecuteRequest::new(
        spec.argv.clone(),
        env.working_dir.clone(),
        env_snapshot(env),
        run_id,
    );
    request.stdin = spec.stdin;
    request
}

#[cfg(test)]
#[path = "run_one_tests.rs"]
mod tests;
