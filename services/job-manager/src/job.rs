//! Job records held by the job manager.
//!
//! A record carries everything the job manager knows about one job: its
//! lifecycle state, scheduler flags, the eventlog, and the annotation store
//! plugins use to pass state between hooks.

use std::collections::{BTreeSet, HashMap};

use jobtap_events::{event_names, ExceptionContext, JobEvent};
use jobtap_id::{JobId, UserId};

use crate::jobtap::{AuxValue, JobtapError};

/// Flags a plugin may set on a job.
pub const KNOWN_FLAGS: &[&str] = &["alloc-bypass", "debug", "waitable"];

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Submitted, validation in progress.
    New,
    /// Waiting for resources.
    Sched,
    /// Running.
    Run,
    /// Releasing resources and running cleanup hooks.
    Cleanup,
    /// Finished. No further changes are accepted.
    Inactive,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::New => "NEW",
            JobState::Sched => "SCHED",
            JobState::Run => "RUN",
            JobState::Cleanup => "CLEANUP",
            JobState::Inactive => "INACTIVE",
        };
        f.write_str(s)
    }
}

/// A single job.
pub struct Job {
    pub id: JobId,
    pub userid: UserId,
    state: JobState,
    flags: BTreeSet<String>,
    aux: HashMap<String, AuxValue>,
    eventlog: Vec<JobEvent>,
    exception: Option<ExceptionContext>,
    has_resources: bool,
}

impl Job {
    pub fn new(id: JobId, userid: UserId) -> Self {
        Self {
            id,
            userid,
            state: JobState::New,
            flags: BTreeSet::new(),
            aux: HashMap::new(),
            eventlog: Vec::new(),
            exception: None,
            has_resources: false,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn set_state(&mut self, state: JobState) {
        self.state = state;
    }

    pub fn aux_get(&self, key: &str) -> Option<AuxValue> {
        self.aux.get(key).cloned()
    }

    /// Set an annotation once. An existing value is never replaced.
    pub fn aux_set(&mut self, key: &str, value: AuxValue) -> Result<(), JobtapError> {
        if self.aux.contains_key(key) {
            return Err(JobtapError::AuxExists {
                job: self.id,
                key: key.to_string(),
            });
        }
        self.aux.insert(key.to_string(), value);
        Ok(())
    }

    pub fn set_flag(&mut self, flag: &str) -> Result<(), JobtapError> {
        if !KNOWN_FLAGS.contains(&flag) {
            return Err(JobtapError::UnknownFlag(flag.to_string()));
        }
        self.flags.insert(flag.to_string());
        Ok(())
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    pub fn eventlog(&self) -> &[JobEvent] {
        &self.eventlog
    }

    /// Append an event and apply its effect on the record.
    pub fn record_event(&mut self, event: JobEvent) {
        match event.name.as_str() {
            event_names::ALLOC => self.has_resources = true,
            event_names::FREE => self.has_resources = false,
            event_names::EXCEPTION => {
                if let Ok(ctx) = event.context_as::<ExceptionContext>() {
                    if ctx.is_fatal() && self.exception.is_none() {
                        self.exception = Some(ctx);
                    }
                }
            }
            _ => {}
        }
        self.eventlog.push(event);
    }

    /// The first fatal exception raised on this job.
    pub fn exception(&self) -> Option<&ExceptionContext> {
        self.exception.as_ref()
    }

    pub fn has_resources(&self) -> bool {
        self.has_resources
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("userid", &self.userid)
            .field("state", &self.state)
            .field("flags", &self.flags)
            .field("aux_keys", &self.aux.keys().collect::<Vec<_>>())
            .field("events", &self.eventlog.len())
            .finish()
    }
}
