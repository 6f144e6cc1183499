//! `job.state.sched`: commit the captured R and post the bypass `alloc`.
//!
//! The hook itself never waits. It starts the KVS commit as a task owned by
//! the job, sets the bypass flag, and returns. The task posts `alloc` once
//! the commit lands.

use std::sync::Arc;

use jobtap_events::{event_names, AllocContext};
use jobtap_id::{IdError, JobId};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};

use super::{
    raise_alloc_exception, CapturedR, NeedsFree, BYPASS_FLAG, CAPTURED_R_KEY, NEEDS_FREE_KEY,
};
use crate::jobtap::{HookArgs, HookError, Jobtap, JobtapError};
use crate::kvs::{KvsClient, KvsError, KvsTxn};

#[derive(Debug, Deserialize)]
struct SchedInput {
    id: JobId,
}

/// Reasons the commit could not be started.
#[derive(Debug, Error)]
enum CommitError {
    #[error(transparent)]
    Key(#[from] IdError),

    #[error(transparent)]
    Txn(#[from] KvsError),

    #[error(transparent)]
    Spawn(#[from] JobtapError),
}

/// The job an in-flight commit belongs to.
///
/// Owned by the commit task and released when the task finishes, whichever
/// way it finishes. A task dropped before completion releases it too.
#[derive(Debug)]
pub(super) struct PendingCommit {
    job: JobId,
}

impl PendingCommit {
    fn new(job: JobId) -> Self {
        Self { job }
    }

    fn job(&self) -> JobId {
        self.job
    }
}

impl Drop for PendingCommit {
    fn drop(&mut self) {
        #[cfg(test)]
        RELEASED.with(|n| n.set(n.get() + 1));
        debug!(job_id = %self.job, "Pending commit released");
    }
}

// Per thread: tests run in parallel, and a current-thread runtime drops its
// tasks on the test's own thread.
#[cfg(test)]
thread_local! {
    static RELEASED: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

#[cfg(test)]
fn released_commits() -> usize {
    RELEASED.with(std::cell::Cell::get)
}

pub(super) fn on_sched(ctx: &Arc<dyn Jobtap>, args: &HookArgs) -> Result<(), HookError> {
    let job = args.job();
    let Some(captured) = ctx.aux_get_as::<CapturedR>(job, CAPTURED_R_KEY) else {
        debug!(job_id = %job, "No captured R; scheduler negotiation applies");
        return Ok(());
    };

    // Fail open: without the flag the job falls back to negotiation.
    let input: SchedInput = match args.unpack() {
        Ok(input) => input,
        Err(e) => {
            let note = format!("failed to decode sched payload: {e}");
            raise_alloc_exception(ctx, job, &note);
            return Err(HookError::failed(args.topic(), note));
        }
    };
    if input.id != job {
        let note = format!("sched payload is for job {}, not {job}", input.id);
        raise_alloc_exception(ctx, job, &note);
        return Err(HookError::failed(args.topic(), note));
    }

    if let Err(e) = start_commit(ctx, job, &captured) {
        raise_alloc_exception(ctx, job, &format!("failed to commit R to kvs: {e}"));
    }

    if let Err(e) = ctx.set_flag(job, BYPASS_FLAG) {
        raise_alloc_exception(ctx, job, &format!("Failed to set alloc-bypass: {e}"));
        return Ok(());
    }

    info!(job_id = %job, "Scheduler negotiation bypassed");
    Ok(())
}

/// Build the transaction and hand the commit to the host's reactor.
fn start_commit(
    ctx: &Arc<dyn Jobtap>,
    job: JobId,
    captured: &CapturedR,
) -> Result<(), CommitError> {
    let key = job.kvs_key("R")?;
    let mut txn = KvsTxn::new();
    txn.put(key, captured.as_str())?;

    let kvs = ctx.kvs();
    let task_ctx = Arc::clone(ctx);
    let pending = PendingCommit::new(job);
    ctx.spawn(
        job,
        Box::pin(async move {
            let result = kvs.commit(txn).await;
            finish_alloc(&task_ctx, pending, result);
        }),
    )?;

    debug!(job_id = %job, "R commit started");
    Ok(())
}

/// Continuation of the commit. Consumes the pending commit.
fn finish_alloc(ctx: &Arc<dyn Jobtap>, pending: PendingCommit, result: Result<(), KvsError>) {
    let job = pending.job();

    if let Err(e) = result {
        error!(job_id = %job, error = %e, "R commit failed");
        raise_alloc_exception(ctx, job, &format!("failed to commit R to kvs: {e}"));
        return;
    }

    let posted = serde_json::to_value(AllocContext::bypass())
        .map_err(|e| e.to_string())
        .and_then(|context| {
            ctx.post_event(job, event_names::ALLOC, Some(context))
                .map_err(|e| e.to_string())
        });
    if let Err(e) = posted {
        raise_alloc_exception(ctx, job, &format!("failed to post alloc event: {e}"));
        return;
    }

    if let Err(e) = ctx.aux_set(job, NEEDS_FREE_KEY, Arc::new(NeedsFree)) {
        error!(job_id = %job, error = %e, "Failed to mark job as needing free");
    }

    info!(job_id = %job, "Bypass alloc posted");
}
