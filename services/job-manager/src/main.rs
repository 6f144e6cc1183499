//! jobtap job manager
//!
//! Replays job submissions through the job manager with the alloc-bypass
//! plugin loaded. Submissions are read from stdin as JSON lines:
//!
//! ```text
//! {"userid": 1000, "jobspec": {...}}
//! ```
//!
//! Every event posted to any job is written to stdout as a JSON line.

use anyhow::Result;
use jobtap_events::JobEvent;
use jobtap_id::UserId;
use jobtap_job_manager::{config, plugins, JobManager, JobManagerError, SchedOutcome};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Deserialize)]
struct Submission {
    /// Defaults to the instance owner.
    #[serde(default)]
    userid: Option<UserId>,
    jobspec: Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to JOBTAP_LOG_LEVEL. Logs go to stderr so
    // stdout carries only events.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    info!("Starting jobtap job manager");
    info!(owner = %config.instance_owner, "Configuration loaded");

    let jm = JobManager::from_config(&config, &plugins::builtin());

    // Create shutdown channel so the printer can flush and stop
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut events = jm.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                received = events.recv() => match received {
                    Ok(event) => print_event(&event),
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "Event printer lagged"),
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown_rx.changed() => {
                    while let Ok(event) = events.try_recv() {
                        print_event(&event);
                    }
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut lineno = 0usize;
    while let Some(line) = lines.next_line().await? {
        lineno += 1;
        if line.trim().is_empty() {
            continue;
        }
        let submission: Submission = match serde_json::from_str(&line) {
            Ok(s) => s,
            Err(e) => {
                warn!(line = lineno, error = %e, "Skipping malformed submission");
                continue;
            }
        };
        let userid = submission.userid.unwrap_or(config.instance_owner);
        if let Err(e) = replay(&jm, userid, submission.jobspec).await {
            warn!(line = lineno, error = %e, "Submission did not complete");
        }
    }

    if !jm.shutdown(config.drain_timeout).await {
        warn!("Shut down with plugin tasks still outstanding");
    }
    let _ = shutdown_tx.send(true);
    if let Err(e) = printer.await {
        error!(error = %e, "Event printer failed");
    }

    info!("Job manager stopped");
    Ok(())
}

fn print_event(event: &JobEvent) {
    match event.to_json_line() {
        Ok(line) => println!("{line}"),
        Err(e) => error!(error = %e, "Failed to encode event"),
    }
}

/// Drive one submission as far as it can go without a scheduler.
async fn replay(jm: &JobManager, userid: UserId, jobspec: Value) -> Result<(), JobManagerError> {
    let id = jm.submit(userid, jobspec)?;
    match jm.schedule(id)? {
        SchedOutcome::Bypassed => {
            let ran = jm.run(id, 0).await;
            jm.cleanup(id).await?;
            jm.purge(id)?;
            ran
        }
        SchedOutcome::Negotiate => {
            info!(job_id = %id, "No scheduler loaded; job left pending");
            Ok(())
        }
    }
}
