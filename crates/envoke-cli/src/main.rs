//! envoke: run isolated command environments honoring their dependency
//! graph, with bounded parallelism and an interrupt cascade.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

mod cli;
mod journal;
mod manifest;
mod orchestrate;
mod report;
mod run_one;
mod spinner;

#[cfg(test)]
mod fake_exec;

use cli::{Cli, Parallel, SkipMissing};
use envoke_core::ConfigError;
use envoke_process::{Interrupt, LocalExecutor};
use journal::InstallPkg;
use manifest::Manifest;
use orchestrate::{EnvRuntime, RunContext};
use run_one::RunOptions;
use spinner::Spinner;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbosity());

    let exit_code = run(cli).await?;
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<i32> {
    let start = Instant::now();

    let install_pkg = match &cli.install_pkg {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::MissingInstallPackage(path.clone()).into());
            }
            if !path.is_file() {
                return Err(ConfigError::InvalidInstallPackage(path.clone()).into());
            }
            Some(InstallPkg::from_path(path)?)
        }
        None => None,
    };

    let manifest = Manifest::load(&cli.conf)?;
    let to_run = manifest.select(&cli.env_list)?;
    debug!(?to_run, "selected environments");

    let colored = std::io::stdout().is_terminal();
    let max_workers = match cli.parallel {
        None => 1,
        Some(Parallel::All) => to_run.len().max(1),
        Some(Parallel::Limit(n)) => n,
    };
    let live = cli.parallel.is_none() || cli.parallel_live;
    let show_progress = !live && cli.verbosity() >= 2 && colored;

    let skip_missing = match cli.skip_missing_interpreters {
        SkipMissing::Config => manifest.skip_missing_interpreters,
        SkipMissing::True => true,
        SkipMissing::False => false,
    };
    let options = RunOptions {
        recreate: cli.recreate,
        no_test: cli.no_test,
        pkg_only: cli.pkg_only,
        skip_missing,
        live,
    };

    let interrupt = Interrupt::new();
    let spinner = Arc::new(Spinner::new(show_progress));
    spinner.start();
    spawn_interrupt_listener(interrupt.clone(), Arc::clone(&spinner));

    let envs: Vec<Arc<EnvRuntime>> = manifest
        .envs
        .iter()
        .cloned()
        .map(|desc| Arc::new(EnvRuntime::new(desc)))
        .collect();
    let ctx = RunContext {
        envs,
        to_run,
        max_workers,
        options,
        colored,
        executor: Arc::new(LocalExecutor::new(colored)),
        interrupt,
        spinner: Arc::clone(&spinner),
    };
    let results = orchestrate::execute(ctx).await?;
    spinner.stop().await;

    if let Some(path) = &cli.result_json {
        journal::write_journal(path, &results, install_pkg.as_ref())?;
    }
    Ok(report::report(start, &results, colored))
}

/// The first Ctrl-C trips the shared interrupt; repeats are absorbed until
/// teardown finishes, so the cascade cannot itself be interrupted.
fn spawn_interrupt_listener(interrupt: Interrupt, spinner: Arc<Spinner>) {
    tokio::spawn(async move {
        let mut first = true;
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            if first {
                first = false;
                error!("[{}] interrupt received - teardown started", std::process::id());
                spinner.disable_report();
                interrupt.trigger();
            } else {
                debug!("interrupt ignored during teardown");
            }
        }
    });
}

fn init_tracing(verbosity: u8) {
    let fallback = match verbosity {
        0 => "error",
        1 | 2 => "warn",
        3 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init()
        .ok();
}
