//! `job.state.cleanup`: post the `free` owed by a bypass `alloc`.

use std::sync::Arc;

use jobtap_events::event_names;
use tracing::{debug, error, info};

use super::{BypassState, NEEDS_FREE_KEY};
use crate::jobtap::{HookArgs, HookError, Jobtap};

/// Never fails: the job is terminating either way.
pub(super) fn on_cleanup(ctx: &Arc<dyn Jobtap>, args: &HookArgs) -> Result<(), HookError> {
    let job = args.job();
    if BypassState::of(ctx.as_ref(), job) != BypassState::Granted {
        debug!(job_id = %job, "No bypass free owed");
        return Ok(());
    }

    match ctx.post_event(job, event_names::FREE, None) {
        Ok(()) => info!(job_id = %job, "Bypass free posted"),
        Err(e) => error!(
            job_id = %job,
            key = NEEDS_FREE_KEY,
            error = %e,
            "Failed to post free event"
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use jobtap_id::JobId;
    use serde_json::json;

    use super::*;
    use crate::jobtap::fake::FakeJobtap;
    use crate::jobtap::Topic;
    use crate::plugins::alloc_bypass::{CapturedR, NeedsFree, CAPTURED_R_KEY};

    fn cleanup(fake: &Arc<FakeJobtap>) -> Result<(), HookError> {
        let args = HookArgs::new(Topic::Cleanup, JobId::new(3), json!({ "id": 3 }));
        on_cleanup(&fake.ctx(), &args)
    }

    fn grant(fake: &Arc<FakeJobtap>) {
        fake.ctx()
            .aux_set(JobId::new(3), NEEDS_FREE_KEY, Arc::new(NeedsFree))
            .unwrap();
    }

    #[test]
    fn test_free_posted_once_when_owed() {
        let fake = FakeJobtap::new(1000);
        grant(&fake);

        cleanup(&fake).unwrap();

        let events = fake.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, "free");
        assert_eq!(events[0].2, None);
    }

    #[test]
    fn test_nothing_owed_without_grant() {
        let fake = FakeJobtap::new(1000);
        cleanup(&fake).unwrap();

        // Captured but never granted.
        fake.ctx()
            .aux_set(JobId::new(3), CAPTURED_R_KEY, Arc::new(CapturedR("{}".into())))
            .unwrap();
        cleanup(&fake).unwrap();

        assert!(fake.events().is_empty());
    }

    #[test]
    fn test_post_failure_is_only_logged() {
        let fake = FakeJobtap::new(1000);
        grant(&fake);
        fake.fail_posts.store(true, Ordering::SeqCst);

        assert_eq!(cleanup(&fake), Ok(()));
        assert!(fake.exceptions().is_empty());
    }
}
