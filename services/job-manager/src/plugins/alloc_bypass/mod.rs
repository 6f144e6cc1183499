//! Allocation bypass.
//!
//! Lets the instance owner submit a job carrying its own resource set (R) at
//! `attributes.system.alloc-bypass.R`. Such a job skips scheduler
//! negotiation: R is written to the job's KVS resource record and an `alloc`
//! event is posted directly, with a matching `free` at cleanup.
//!
//! The three callbacks share state only through job annotations:
//!
//! ```text
//! validate ──captured-R──▶ sched ──needs-free──▶ cleanup
//! ```

mod cleanup;
mod sched;
mod validate;

use std::sync::Arc;

use jobtap_events::SEVERITY_FATAL;
use jobtap_id::JobId;
use tracing::error;

use crate::jobtap::{Handler, Jobtap, Plugin, Topic};

pub const PLUGIN_NAME: &str = "alloc-bypass";

/// Annotation holding the R captured at validation.
pub const CAPTURED_R_KEY: &str = "alloc-bypass::captured-R";

/// Annotation marking that a bypass `alloc` was posted and a `free` is owed.
pub const NEEDS_FREE_KEY: &str = "alloc-bypass::needs-free";

/// Scheduler flag set on bypassed jobs.
pub const BYPASS_FLAG: &str = "alloc-bypass";

/// Exception type raised for allocation failures.
pub const EXCEPTION_TYPE: &str = "alloc";

/// R in canonical form (compact JSON, sorted keys), as committed to the KVS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedR(pub String);

impl CapturedR {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Presence marker for [`NEEDS_FREE_KEY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeedsFree;

/// Where a job stands with respect to the bypass, as read from its
/// annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassState {
    /// No R was supplied.
    NoBypass,
    /// R was captured; no `alloc` has been posted for it.
    Captured,
    /// A bypass `alloc` was posted; a `free` is owed at cleanup.
    Granted,
}

impl BypassState {
    pub fn of(ctx: &dyn Jobtap, job: JobId) -> Self {
        if ctx.aux_contains(job, NEEDS_FREE_KEY) {
            BypassState::Granted
        } else if ctx.aux_contains(job, CAPTURED_R_KEY) {
            BypassState::Captured
        } else {
            BypassState::NoBypass
        }
    }
}

const HANDLERS: &[Handler] = &[
    Handler {
        topic: Topic::Validate,
        callback: validate::on_validate,
    },
    Handler {
        topic: Topic::Sched,
        callback: sched::on_sched,
    },
    Handler {
        topic: Topic::Cleanup,
        callback: cleanup::on_cleanup,
    },
];

/// The plugin's registration table.
pub fn plugin() -> Plugin {
    Plugin {
        name: PLUGIN_NAME,
        handlers: HANDLERS,
    }
}

/// Raise a fatal `alloc` exception. A failure to raise is only logged.
fn raise_alloc_exception(ctx: &Arc<dyn Jobtap>, job: JobId, note: &str) {
    if let Err(e) = ctx.raise_exception(job, EXCEPTION_TYPE, SEVERITY_FATAL, note) {
        error!(job_id = %job, note, error = %e, "Failed to raise alloc exception");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobtap::fake::FakeJobtap;

    #[test]
    fn test_registration_table() {
        let plugin = plugin();
        assert_eq!(plugin.name, "alloc-bypass");
        for topic in [Topic::Validate, Topic::Sched, Topic::Cleanup] {
            assert_eq!(plugin.handlers_for(topic).count(), 1, "{topic}");
        }
    }

    #[test]
    fn test_bypass_state_follows_annotations() {
        let fake = FakeJobtap::new(1000);
        let ctx = fake.ctx();
        let job = JobId::new(1);
        assert_eq!(BypassState::of(ctx.as_ref(), job), BypassState::NoBypass);

        ctx.aux_set(job, CAPTURED_R_KEY, Arc::new(CapturedR("{}".into())))
            .unwrap();
        assert_eq!(BypassState::of(ctx.as_ref(), job), BypassState::Captured);

        ctx.aux_set(job, NEEDS_FREE_KEY, Arc::new(NeedsFree)).unwrap();
        assert_eq!(BypassState::of(ctx.as_ref(), job), BypassState::Granted);
    }
}
