//! `job.validate`: eligibility check and capture of R.

use std::sync::Arc;

use jobtap_id::UserId;
use jobtap_rlist::ResourceSet;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{CapturedR, CAPTURED_R_KEY};
use crate::jobtap::{HookArgs, HookError, Jobtap};

#[derive(Debug, Deserialize)]
struct ValidateInput {
    userid: UserId,
    jobspec: Jobspec,
}

#[derive(Debug, Deserialize)]
struct Jobspec {
    #[serde(default)]
    attributes: Option<Attributes>,
}

#[derive(Debug, Deserialize)]
struct Attributes {
    #[serde(default)]
    system: Option<SystemAttributes>,
}

#[derive(Debug, Deserialize)]
struct SystemAttributes {
    #[serde(default, rename = "alloc-bypass")]
    alloc_bypass: Option<AllocBypassAttribute>,
}

#[derive(Debug, Deserialize)]
struct AllocBypassAttribute {
    /// `null` deserializes to `None` as well.
    #[serde(default, rename = "R")]
    r: Option<Value>,
}

impl ValidateInput {
    fn resource_set(&self) -> Option<&Value> {
        self.jobspec
            .attributes
            .as_ref()?
            .system
            .as_ref()?
            .alloc_bypass
            .as_ref()?
            .r
            .as_ref()
    }
}

pub(super) fn on_validate(ctx: &Arc<dyn Jobtap>, args: &HookArgs) -> Result<(), HookError> {
    let job = args.job();
    let input: ValidateInput = args
        .unpack()
        .map_err(|e| HookError::reject(format!("invalid system.alloc-bypass.R: {e}")))?;

    let Some(r) = input.resource_set() else {
        debug!(job_id = %job, "No alloc-bypass R supplied");
        return Ok(());
    };

    let owner = ctx.instance_owner();
    if input.userid != owner {
        warn!(
            job_id = %job,
            userid = %input.userid,
            owner = %owner,
            "Guest alloc-bypass attempt"
        );
        return Err(HookError::reject("Guest user cannot use alloc bypass"));
    }

    let resources = ResourceSet::from_json(r)
        .map_err(|e| HookError::reject(format!("alloc-bypass: invalid R: {e}")))?;

    // serde_json maps keep keys sorted, so this is canonical.
    let captured = CapturedR(r.to_string());
    ctx.aux_set(job, CAPTURED_R_KEY, Arc::new(captured))
        .map_err(|e| HookError::reject(format!("failed to capture alloc-bypass R: {e}")))?;

    info!(
        job_id = %job,
        nnodes = resources.nnodes(),
        ncores = resources.count("core"),
        "Captured alloc-bypass R"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobtap::fake::FakeJobtap;
    use crate::jobtap::Topic;
    use crate::plugins::alloc_bypass::BypassState;
    use jobtap_id::JobId;
    use jobtap_testing::fixtures;
    use rstest::rstest;
    use serde_json::json;

    const OWNER: u32 = 1000;

    fn validate(fake: &Arc<FakeJobtap>, userid: u32, jobspec: Value) -> Result<(), HookError> {
        let args = HookArgs::new(
            Topic::Validate,
            JobId::new(1),
            json!({ "id": 1, "userid": userid, "jobspec": jobspec }),
        );
        on_validate(&fake.ctx(), &args)
    }

    fn captured(fake: &Arc<FakeJobtap>) -> Option<String> {
        fake.ctx()
            .aux_get_as::<CapturedR>(JobId::new(1), CAPTURED_R_KEY)
            .map(|r| r.as_str().to_string())
    }

    #[rstest]
    #[case::no_attributes(json!({"version": 1}))]
    #[case::no_system(json!({"attributes": {}}))]
    #[case::no_alloc_bypass(fixtures::jobspec())]
    #[case::null_r(json!({"attributes": {"system": {"alloc-bypass": {"R": null}}}}))]
    #[case::no_r(json!({"attributes": {"system": {"alloc-bypass": {}}}}))]
    fn test_absent_r_is_a_no_op(#[case] jobspec: Value) {
        let fake = FakeJobtap::new(OWNER);
        // A guest without R is unaffected.
        assert_eq!(validate(&fake, OWNER + 1, jobspec), Ok(()));
        assert_eq!(BypassState::of(fake.ctx().as_ref(), JobId::new(1)), BypassState::NoBypass);
    }

    #[test]
    fn test_owner_r_is_captured_canonically() {
        let fake = FakeJobtap::new(OWNER);
        let r = fixtures::resource_set(2, 4);
        validate(&fake, OWNER, fixtures::jobspec_with_r(r.clone())).unwrap();

        assert_eq!(captured(&fake), Some(serde_json::to_string(&r).unwrap()));
        let text = captured(&fake).unwrap();
        assert!(!text.contains(' '), "not compact: {text}");
        assert!(text.find("\"execution\"") < text.find("\"version\""));
    }

    #[test]
    fn test_guest_is_rejected() {
        let fake = FakeJobtap::new(OWNER);
        let err = validate(
            &fake,
            OWNER + 1,
            fixtures::jobspec_with_r(fixtures::resource_set(1, 1)),
        )
        .unwrap_err();

        assert_eq!(err, HookError::reject("Guest user cannot use alloc bypass"));
        assert!(captured(&fake).is_none());
    }

    #[rstest]
    #[case::missing_version(json!({"execution": {"R_lite": []}}), "missing R version")]
    #[case::bad_version(json!({"version": 2, "execution": {"R_lite": []}}), "invalid version=2")]
    #[case::bad_idset(
        json!({"version": 1, "execution": {"R_lite": [{"rank": "x", "children": {"core": "0"}}]}}),
        "invalid idset 'x'"
    )]
    #[case::not_object(json!("R"), "R must be a JSON object")]
    fn test_invalid_r_is_rejected_with_diagnostic(#[case] r: Value, #[case] diag: &str) {
        let fake = FakeJobtap::new(OWNER);
        let err = validate(&fake, OWNER, fixtures::jobspec_with_r(r)).unwrap_err();

        assert_eq!(err, HookError::reject(format!("alloc-bypass: invalid R: {diag}")));
        assert!(captured(&fake).is_none());
    }

    #[test]
    fn test_malformed_attribute_is_rejected() {
        let fake = FakeJobtap::new(OWNER);
        let jobspec = json!({"attributes": {"system": {"alloc-bypass": "yes"}}});
        let err = validate(&fake, OWNER, jobspec).unwrap_err();
        assert!(
            err.to_string().starts_with("invalid system.alloc-bypass.R: "),
            "{err}"
        );
    }

    #[test]
    fn test_capture_never_overwrites() {
        let fake = FakeJobtap::new(OWNER);
        let jobspec = fixtures::jobspec_with_r(fixtures::resource_set(1, 1));
        validate(&fake, OWNER, jobspec.clone()).unwrap();
        let first = captured(&fake);

        let err = validate(
            &fake,
            OWNER,
            fixtures::jobspec_with_r(fixtures::resource_set(4, 4)),
        )
        .unwrap_err();
        assert!(
            err.to_string().starts_with("failed to capture alloc-bypass R: "),
            "{err}"
        );
        assert_eq!(captured(&fake), first);
    }
}
