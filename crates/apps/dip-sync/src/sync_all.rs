//! `dip-sync all`: run every endpoint sync as a child process
//!
//! Each endpoint runs in its own `dip-sync sync` process so that a crash or
//! fatal error in one endpoint does not take down the others. The child is
//! registered as the interrupt delegate while it runs: a first Ctrl-C is
//! forwarded so the child can checkpoint, a second one kills it.

use std::process::{Command, ExitCode, ExitStatus};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use ingest::sync::timing::format_duration;
use ingest::{DipEndpoint, InterruptController};
use log::{error, info, warn};

use crate::delegate::ChildProcess;
use crate::{ApiArgs, CHILD_KEY_ENV, EXIT_INTERRUPTED, StateArgs};

#[derive(Args, Debug, Clone)]
pub struct AllArgs {
    /// Comma-separated list of endpoints to run
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<DipEndpoint>,

    /// Comma-separated list of endpoints to skip
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<DipEndpoint>,

    /// Continue with the next endpoint if one fails
    #[arg(long = "continue")]
    pub continue_on_error: bool,

    /// Show the plan without running anything
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub api: ApiArgs,

    #[command(flatten)]
    pub state: StateArgs,
}

/// Endpoints to run, in sync order
pub fn plan(only: &[DipEndpoint], skip: &[DipEndpoint]) -> Vec<DipEndpoint> {
    DipEndpoint::ALL
        .into_iter()
        .filter(|e| only.is_empty() || only.contains(e))
        .filter(|e| !skip.contains(e))
        .collect()
}

/// How one child sync ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildOutcome {
    Succeeded,
    Interrupted,
    Failed,
}

impl From<ExitStatus> for ChildOutcome {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => ChildOutcome::Succeeded,
            Some(code) if code == i32::from(EXIT_INTERRUPTED) => ChildOutcome::Interrupted,
            _ => ChildOutcome::Failed,
        }
    }
}

pub async fn run(args: &AllArgs) -> Result<ExitCode> {
    let endpoints = plan(&args.only, &args.skip);

    info!("Sync plan ({} endpoints):", endpoints.len());
    for (i, endpoint) in endpoints.iter().enumerate() {
        info!("  [{}] {}", i + 1, endpoint);
    }

    if args.dry_run {
        info!("Dry run, no syncs performed");
        return Ok(ExitCode::SUCCESS);
    }

    let exe = std::env::current_exe().context("Failed to locate dip-sync executable")?;
    let controller = InterruptController::new();
    controller.arm(
        || warn!("Stopping after the current endpoint"),
        || warn!("Killing the current endpoint"),
    );

    let started = Instant::now();
    let mut succeeded = 0;
    let mut failed: Vec<DipEndpoint> = Vec::new();
    let mut interrupted = false;

    for (i, endpoint) in endpoints.iter().copied().enumerate() {
        if controller.stop_requested() {
            warn!("Skipping remaining endpoints due to interrupt");
            interrupted = true;
            failed.extend(&endpoints[i..]);
            break;
        }

        info!("[{}/{}] Running {}", i + 1, endpoints.len(), endpoint);
        let endpoint_started = Instant::now();

        let mut command = Command::new(&exe);
        command.args(child_args(endpoint, args));
        if let Some(key) = &args.api.key {
            command.env(CHILD_KEY_ENV, key);
        }
        #[cfg(unix)]
        {
            // Own process group: terminal Ctrl-C reaches only the parent,
            // which forwards it through the delegate.
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let outcome = match run_child(&controller, command, endpoint).await {
            Ok(status) => ChildOutcome::from(status),
            Err(e) => {
                error!("Failed to run {}: {:#}", endpoint, e);
                ChildOutcome::Failed
            }
        };
        let took = format_duration(endpoint_started.elapsed());

        match outcome {
            ChildOutcome::Succeeded => {
                succeeded += 1;
                info!("Completed {} (took {})", endpoint, took);
            }
            ChildOutcome::Interrupted => {
                warn!("Interrupted {} (took {})", endpoint, took);
                interrupted = true;
                failed.extend(&endpoints[i..]);
                break;
            }
            ChildOutcome::Failed => {
                error!("Failed {} (took {})", endpoint, took);
                failed.push(endpoint);
                if !args.continue_on_error {
                    error!("Stopping due to error, use --continue to keep going");
                    break;
                }
            }
        }
    }

    controller.disarm();
    summarize(started.elapsed(), succeeded, endpoints.len(), &failed);

    Ok(if interrupted {
        ExitCode::from(EXIT_INTERRUPTED)
    } else if failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Arguments for the child `dip-sync sync` invocation
///
/// The API key is passed through the environment so it does not show up in
/// process listings.
fn child_args(endpoint: DipEndpoint, args: &AllArgs) -> Vec<String> {
    let mut child = vec![
        "sync".to_string(),
        endpoint.path().to_string(),
        "--db".to_string(),
        args.state.db.display().to_string(),
        "--checkpoint-dir".to_string(),
        args.state.checkpoint_dir.display().to_string(),
        "--failed-dir".to_string(),
        args.state.failed_dir.display().to_string(),
        "--rate".to_string(),
        args.api.rate.to_string(),
        "--interval-secs".to_string(),
        args.api.interval_secs.to_string(),
    ];
    if let Some(url) = &args.api.url {
        child.push("--url".to_string());
        child.push(url.clone());
    }
    if args.api.limit > 0 {
        child.push("--limit".to_string());
        child.push(args.api.limit.to_string());
    }
    if args.api.resume {
        child.push("--resume".to_string());
    }
    child
}

async fn run_child(
    controller: &InterruptController,
    mut command: Command,
    endpoint: DipEndpoint,
) -> Result<ExitStatus> {
    let mut child = command.spawn().context("Failed to spawn child sync")?;
    controller.set_delegate(Arc::new(ChildProcess::new(child.id(), endpoint.to_string())));

    let status = tokio::task::spawn_blocking(move || child.wait())
        .await
        .context("Child wait task failed")?
        .context("Failed to wait for child sync");

    controller.clear_delegate();
    status
}

fn summarize(elapsed: Duration, succeeded: usize, total: usize, failed: &[DipEndpoint]) {
    info!("Total time: {}", format_duration(elapsed));
    info!("Successful: {}/{}", succeeded, total);
    if failed.is_empty() {
        info!("All syncs completed successfully");
        return;
    }

    warn!("Failed or skipped: {}/{}", failed.len(), total);
    for endpoint in failed {
        warn!("  - {}", endpoint);
    }
}
