//! Driver loop: bounded worker pool, interrupt coalescing, teardown ordering.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use owo_colors::OwoColorize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use envoke_core::EnvDescriptor;
use envoke_process::{Execute, Interrupt};

use crate::run_one::{CODE_CANCELLED, CODE_INTERRUPTED, RunOptions, RunResult, run_one};
use crate::spinner::Spinner;

/// One environment's runtime state alongside its immutable descriptor.
pub struct EnvRuntime {
    pub desc: EnvDescriptor,
    tore_down: AtomicBool,
}

impl EnvRuntime {
    pub fn new(desc: EnvDescriptor) -> Self {
        Self {
            desc,
            tore_down: AtomicBool::new(false),
        }
    }

    /// Idempotent post-run hook; invoked for every environment once the
    /// driver is done, and early for environments denied dispatch.
    pub fn teardown(&self) {
        if !self.tore_down.swap(true, Ordering::SeqCst) {
            debug!(env = %self.desc.name, "teardown complete");
        }
    }

    #[cfg(test)]
    pub fn torn_down(&self) -> bool {
        self.tore_down.load(Ordering::SeqCst)
    }
}

/// Everything the driver needs for one run.
pub struct RunContext {
    /// Every manifest environment; the teardown universe.
    pub envs: Vec<Arc<EnvRuntime>>,
    /// Selected active environments, input order.
    pub to_run: Vec<String>,
    pub max_workers: usize,
    pub options: RunOptions,
    pub colored: bool,
    pub executor: Arc<dyn Execute>,
    pub interrupt: Interrupt,
    pub spinner: Arc<Spinner>,
}

/// Drive every selected environment to completion and return the results
/// ordered by the input environment order.
///
/// Exactly one result is produced per selected environment: a real run, the
/// -2 sentinel when the interrupt beat its dispatch, or the -3 sentinel when
/// its worker was cancelled in flight. Teardown of every environment is
/// guaranteed before the call returns, on errors included.
pub async fn execute(ctx: RunContext) -> anyhow::Result<Vec<RunResult>> {
    let by_name: HashMap<String, Arc<EnvRuntime>> = ctx
        .envs
        .iter()
        .map(|runtime| (runtime.desc.name.clone(), Arc::clone(runtime)))
        .collect();
    let descriptors: Vec<EnvDescriptor> =
        ctx.envs.iter().map(|runtime| runtime.desc.clone()).collect();

    let mut batches = match envoke_scheduler::run_order(&descriptors, &ctx.to_run) {
        Ok(batches) => batches,
        Err(err) => {
            for runtime in &ctx.envs {
                runtime.teardown();
            }
            return Err(err.into());
        }
    };

    let semaphore = Arc::new(Semaphore::new(ctx.max_workers.max(1)));
    let mut join_set: JoinSet<RunResult> = JoinSet::new();
    let mut id_to_name: HashMap<tokio::task::Id, String> = HashMap::new();
    let mut completed: HashSet<String> = HashSet::new();
    let mut results: Vec<RunResult> = Vec::new();

    let mut ready = batches.next_batch(&completed);
    loop {
        for name in ready.drain(..) {
            let Some(runtime) = by_name.get(&name) else {
                warn!(env = %name, "selected environment has no descriptor");
                continue;
            };
            if ctx.interrupt.is_set() {
                // denied dispatch: synthesize the result without a worker
                runtime.teardown();
                let result = RunResult::synthesized(&name, CODE_INTERRUPTED);
                completed.insert(name);
                finish_env(&result, &by_name, &ctx);
                results.push(result);
                continue;
            }
            let handle = join_set.spawn(worker(
                Arc::clone(runtime),
                Arc::clone(&semaphore),
                ctx.options,
                Arc::clone(&ctx.executor),
                ctx.interrupt.clone(),
                Arc::clone(&ctx.spinner),
            ));
            id_to_name.insert(handle.id(), name);
        }

        if join_set.is_empty() {
            ready = batches.next_batch(&completed);
            if ready.is_empty() {
                if !batches.is_exhausted() {
                    warn!(pending = ?batches.pending(), "schedule wedged; abandoning remaining environments");
                }
                break;
            }
            continue;
        }

        let result = match join_set.join_next_with_id().await {
            Some(Ok((id, result))) => {
                id_to_name.remove(&id);
                result
            }
            Some(Err(join_err)) => {
                // worker cancelled or panicked before returning a result
                let name = match id_to_name.remove(&join_err.id()) {
                    Some(name) => name,
                    None => {
                        warn!("completed worker has no registered environment");
                        continue;
                    }
                };
                if join_err.is_panic() {
                    error!(env = %name, "environment worker panicked");
                }
                if let Some(runtime) = by_name.get(&name) {
                    runtime.teardown();
                }
                RunResult::synthesized(name, CODE_CANCELLED)
            }
            None => break,
        };

        completed.insert(result.name.clone());
        finish_env(&result, &by_name, &ctx);
        results.push(result);
        ready = batches.next_batch(&completed);
    }

    // teardown every environment, including config-only ones that never ran
    for runtime in &ctx.envs {
        runtime.teardown();
    }

    Ok(order_results(results, &ctx.to_run))
}

fn worker(
    runtime: Arc<EnvRuntime>,
    semaphore: Arc<Semaphore>,
    options: RunOptions,
    executor: Arc<dyn Execute>,
    interrupt: Interrupt,
    spinner: Arc<Spinner>,
) -> impl std::future::Future<Output = RunResult> + Send + 'static {
    async move {
        let name = runtime.desc.name.clone();
        let _permit = tokio::select! {
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return RunResult::synthesized(name, CODE_CANCELLED),
            },
            _ = interrupt.notified() => {
                debug!(env = %name, "cancelled while waiting for a worker slot");
                return RunResult::synthesized(name, CODE_CANCELLED);
            }
        };
        spinner.add(&name);
        run_one(&runtime.desc, executor.as_ref(), options, &interrupt).await
    }
}

/// Spinner finalize plus the quiet-mode flush of captured output.
fn finish_env(result: &RunResult, by_name: &HashMap<String, Arc<EnvRuntime>>, ctx: &RunContext) {
    if result.is_ok() {
        if result.skipped {
            ctx.spinner.skip(&result.name);
        } else {
            ctx.spinner.succeed(&result.name);
        }
    } else {
        ctx.spinner.fail(&result.name);
    }

    let shown_live = ctx.options.live
        || by_name
            .get(&result.name)
            .is_some_and(|runtime| runtime.desc.parallel_show_output);
    if !shown_live && !result.is_ok() {
        flush_captured(result, ctx.colored);
    }
}

/// Print an environment's captured output after the fact: setup outcomes
/// first, then the test commands; err goes to stderr.
fn flush_captured(result: &RunResult, colored: bool) {
    for outcome in &result.outcomes {
        if !outcome.out.is_empty() {
            print!("{}", outcome.out);
            let _ = std::io::stdout().flush();
        }
        if !outcome.err.is_empty() {
            if colored {
                eprint!("{}", outcome.err.red());
            } else {
                eprint!("{}", outcome.err);
            }
        }
    }
}

/// Reorder driver-completion order into the original input order.
fn order_results(results: Vec<RunResult>, to_run: &[String]) -> Vec<RunResult> {
    let mut by_name: HashMap<String, RunResult> = results
        .into_iter()
        .map(|result| (result.name.clone(), result))
        .collect();
    to_run
        .iter()
        .filter_map(|name| by_name.remove(name))
        .collect()
}

#[cfg(test)]
#[path = "orchestrate_tests.rs"]
mod tests;
