//! Job manager: job records, lifecycle transitions, and plugin dispatch.
//!
//! The job manager owns every job record and drives each job through
//! `submit → sched → run → cleanup → inactive`, invoking plugin callbacks at
//! each transition. Plugins act on jobs only through the [`Jobtap`] handle.
//!
//! Asynchronous work a plugin starts for a job is tracked per job and
//! drained before that job runs or enters cleanup, so a plugin may rely on
//! its scheduling-phase work having resolved by then.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use jobtap_events::{event_names, ExceptionContext, FinishContext, JobEvent, SubmitContext};
use jobtap_id::{JobId, UserId};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::job::{Job, JobState};
use crate::jobtap::{AuxValue, HookArgs, HookError, Jobtap, JobtapError, Plugin, Topic};
use crate::kvs::{KvsClient, MemoryKvs};

/// Eventlog broadcast capacity.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Errors from job manager operations.
#[derive(Debug, Error)]
pub enum JobManagerError {
    /// A validate callback rejected the submission. No job was created.
    #[error("job rejected: {0}")]
    Rejected(String),

    #[error("unknown job {0}")]
    UnknownJob(JobId),

    #[error("job {id} is {state}, expected {expected}")]
    InvalidState {
        id: JobId,
        state: JobState,
        expected: &'static str,
    },

    /// The job reached run without an `alloc` event.
    #[error("job {0} has no resources")]
    NotAllocated(JobId),

    /// A fatal exception was raised on the job.
    #[error("job {id} failed in {kind}: {note}")]
    JobFailed {
        id: JobId,
        kind: String,
        note: String,
    },

    #[error(transparent)]
    Jobtap(#[from] JobtapError),
}

/// What the scheduling transition decided for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedOutcome {
    /// A plugin supplied resources; scheduler negotiation is skipped.
    Bypassed,
    /// The job waits for the scheduler.
    Negotiate,
}

/// Builder for [`JobManager`].
pub struct JobManagerBuilder {
    owner: UserId,
    kvs: Option<Arc<dyn KvsClient>>,
    plugins: Vec<Plugin>,
}

impl JobManagerBuilder {
    /// The instance owner. Defaults to the process's real uid.
    pub fn owner(mut self, owner: UserId) -> Self {
        self.owner = owner;
        self
    }

    pub fn kvs(mut self, kvs: Arc<dyn KvsClient>) -> Self {
        self.kvs = Some(kvs);
        self
    }

    /// Load a plugin. Callbacks run in load order.
    pub fn plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn build(self) -> JobManager {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        for plugin in &self.plugins {
            info!(
                plugin = plugin.name,
                handlers = plugin.handlers.len(),
                "Loaded jobtap plugin"
            );
        }
        JobManager {
            host: Arc::new(Host {
                owner: self.owner,
                kvs: self
                    .kvs
                    .unwrap_or_else(|| Arc::new(MemoryKvs::new()) as Arc<dyn KvsClient>),
                plugins: self.plugins,
                jobs: Mutex::new(HashMap::new()),
                tasks: Mutex::new(HashMap::new()),
                events,
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

/// The job manager.
#[derive(Clone)]
pub struct JobManager {
    host: Arc<Host>,
}

impl JobManager {
    pub fn builder() -> JobManagerBuilder {
        JobManagerBuilder {
            owner: crate::config::process_uid(),
            kvs: None,
            plugins: Vec::new(),
        }
    }

    /// Build a job manager from configuration with an in-memory KVS.
    pub fn from_config(config: &Config, plugins: &[Plugin]) -> Self {
        let kvs = Arc::new(MemoryKvs::with_latency(config.kvs_commit_latency));
        plugins
            .iter()
            .fold(
                Self::builder().owner(config.instance_owner).kvs(kvs),
                |builder, plugin| builder.plugin(*plugin),
            )
            .build()
    }

    /// Subscribe to every event posted to any job.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.host.events.subscribe()
    }

    /// Submit a job. Validate callbacks run before the job exists; a
    /// rejection leaves no record behind.
    #[instrument(skip(self, jobspec))]
    pub fn submit(&self, userid: UserId, jobspec: Value) -> Result<JobId, JobManagerError> {
        let id = JobId::new(self.host.next_id.fetch_add(1, Ordering::SeqCst));
        self.host.jobs().insert(id, Job::new(id, userid));

        let input = json!({ "id": id, "userid": userid, "jobspec": jobspec });
        if let Err(e) = Host::call_hooks(&self.host, Topic::Validate, id, input) {
            // Dropping the record releases any annotations set so far.
            let rejected = self.host.jobs().remove(&id);
            drop(rejected);
            warn!(job_id = %id, userid = %userid, reason = %e, "Job rejected");
            return Err(JobManagerError::Rejected(e.to_string()));
        }

        self.host.set_state(id, JobState::Sched)?;
        self.host
            .post_typed(id, event_names::SUBMIT, &SubmitContext { userid: userid.value() })?;
        info!(job_id = %id, userid = %userid, "Job submitted");
        Ok(id)
    }

    /// Run the scheduling transition for a job.
    #[instrument(skip(self))]
    pub fn schedule(&self, id: JobId) -> Result<SchedOutcome, JobManagerError> {
        let userid = self.host.expect_state(id, JobState::Sched, "SCHED")?;

        let input = json!({ "id": id, "userid": userid, "state": JobState::Sched.to_string() });
        // Sched callbacks never reject; failures were already logged.
        let _ = Host::call_hooks(&self.host, Topic::Sched, id, input);

        let bypassed = self
            .host
            .with_job(id, |job| job.has_flag("alloc-bypass"))?;
        if bypassed {
            info!(job_id = %id, "Scheduler negotiation bypassed");
            Ok(SchedOutcome::Bypassed)
        } else {
            debug!(job_id = %id, "Job waiting for scheduler");
            Ok(SchedOutcome::Negotiate)
        }
    }

    /// Run a job to completion with the given wait status.
    #[instrument(skip(self))]
    pub async fn run(&self, id: JobId, status: i32) -> Result<(), JobManagerError> {
        self.drain(id).await;

        self.host.expect_state(id, JobState::Sched, "SCHED")?;
        let (has_resources, exception) = self
            .host
            .with_job(id, |job| (job.has_resources(), job.exception().cloned()))?;
        if let Some(ex) = exception {
            return Err(JobManagerError::JobFailed {
                id,
                kind: ex.kind,
                note: ex.note,
            });
        }
        if !has_resources {
            return Err(JobManagerError::NotAllocated(id));
        }

        self.host.set_state(id, JobState::Run)?;
        self.host.post_event(id, event_names::START, None)?;
        self.host
            .post_typed(id, event_names::FINISH, &FinishContext { status })?;
        info!(job_id = %id, status, "Job finished");
        Ok(())
    }

    /// Run the cleanup transition. The job becomes inactive.
    #[instrument(skip(self))]
    pub async fn cleanup(&self, id: JobId) -> Result<(), JobManagerError> {
        self.drain(id).await;

        let state = self.host.with_job(id, Job::state)?;
        if !matches!(state, JobState::Sched | JobState::Run) {
            return Err(JobManagerError::InvalidState {
                id,
                state,
                expected: "SCHED or RUN",
            });
        }
        self.host.set_state(id, JobState::Cleanup)?;

        let userid = self.host.with_job(id, |job| job.userid)?;
        let input = json!({ "id": id, "userid": userid, "state": JobState::Cleanup.to_string() });
        let _ = Host::call_hooks(&self.host, Topic::Cleanup, id, input);

        if self.host.with_job(id, Job::has_resources)? {
            debug!(job_id = %id, "Resources still held at cleanup; scheduler releases them");
        }

        self.host.post_event(id, event_names::CLEAN, None)?;
        self.host.set_state(id, JobState::Inactive)?;
        info!(job_id = %id, "Job inactive");
        Ok(())
    }

    /// Destroy an inactive job record, releasing its annotations.
    pub fn purge(&self, id: JobId) -> Result<(), JobManagerError> {
        self.host.expect_state(id, JobState::Inactive, "INACTIVE")?;
        let purged = self.host.jobs().remove(&id);
        drop(purged);
        debug!(job_id = %id, "Job purged");
        Ok(())
    }

    /// Wait for every outstanding plugin task, up to `timeout`. Tasks still
    /// running at the deadline are aborted. Returns true if all finished.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let handles: Vec<JoinHandle<()>> = self
            .host
            .tasks()
            .drain()
            .flat_map(|(_, handles)| handles)
            .collect();
        if handles.is_empty() {
            return true;
        }

        info!(count = handles.len(), "Draining outstanding plugin tasks");
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let drained = tokio::time::timeout(timeout, async {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Plugin task did not complete");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                timeout_secs = timeout.as_secs(),
                "Plugin tasks did not drain in time; aborting"
            );
            for abort in aborts {
                abort.abort();
            }
            return false;
        }
        true
    }

    /// Wait for the job's outstanding plugin tasks.
    async fn drain(&self, id: JobId) {
        let handles = self.host.tasks().remove(&id).unwrap_or_default();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(job_id = %id, error = %e, "Plugin task did not complete");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn contains(&self, id: JobId) -> bool {
        self.host.jobs().contains_key(&id)
    }

    pub fn state(&self, id: JobId) -> Option<JobState> {
        self.host.with_job(id, Job::state).ok()
    }

    pub fn eventlog(&self, id: JobId) -> Option<Vec<JobEvent>> {
        self.host.with_job(id, |job| job.eventlog().to_vec()).ok()
    }

    pub fn has_flag(&self, id: JobId, flag: &str) -> bool {
        self.host
            .with_job(id, |job| job.has_flag(flag))
            .unwrap_or(false)
    }

    pub fn aux_contains(&self, id: JobId, key: &str) -> bool {
        self.host.aux_get(id, key).is_some()
    }

    pub fn aux_get(&self, id: JobId, key: &str) -> Option<AuxValue> {
        self.host.aux_get(id, key)
    }

    pub fn exception(&self, id: JobId) -> Option<ExceptionContext> {
        self.host
            .with_job(id, |job| job.exception().cloned())
            .ok()
            .flatten()
    }

    /// The KVS this job manager commits to.
    pub fn kvs(&self) -> Arc<dyn KvsClient> {
        self.host.kvs.clone()
    }
}

// =============================================================================
// Host
// =============================================================================

struct Host {
    owner: UserId,
    kvs: Arc<dyn KvsClient>,
    plugins: Vec<Plugin>,
    jobs: Mutex<HashMap<JobId, Job>>,
    tasks: Mutex<HashMap<JobId, Vec<JoinHandle<()>>>>,
    events: broadcast::Sender<JobEvent>,
    next_id: AtomicU64,
}

impl Host {
    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<JobId, Vec<JoinHandle<()>>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_job<T>(&self, id: JobId, f: impl FnOnce(&Job) -> T) -> Result<T, JobtapError> {
        let jobs = self.jobs();
        jobs.get(&id).map(f).ok_or(JobtapError::UnknownJob(id))
    }

    fn with_job_mut<T>(
        &self,
        id: JobId,
        f: impl FnOnce(&mut Job) -> Result<T, JobtapError>,
    ) -> Result<T, JobtapError> {
        let mut jobs = self.jobs();
        let job = jobs.get_mut(&id).ok_or(JobtapError::UnknownJob(id))?;
        if job.state() == JobState::Inactive {
            return Err(JobtapError::Inactive(id));
        }
        f(job)
    }

    fn set_state(&self, id: JobId, state: JobState) -> Result<(), JobtapError> {
        self.with_job_mut(id, |job| {
            debug!(job_id = %id, from = %job.state(), to = %state, "Job state transition");
            job.set_state(state);
            Ok(())
        })
    }

    /// Check the job is in `state`; returns its owner.
    fn expect_state(
        &self,
        id: JobId,
        state: JobState,
        expected: &'static str,
    ) -> Result<UserId, JobManagerError> {
        let jobs = self.jobs();
        let job = jobs.get(&id).ok_or(JobManagerError::UnknownJob(id))?;
        if job.state() != state {
            return Err(JobManagerError::InvalidState {
                id,
                state: job.state(),
                expected,
            });
        }
        Ok(job.userid)
    }

    fn post_typed<C: serde::Serialize>(
        &self,
        id: JobId,
        name: &str,
        context: &C,
    ) -> Result<(), JobtapError> {
        let context = serde_json::to_value(context).map_err(jobtap_events::EventError::from)?;
        self.post_event(id, name, Some(context))
    }

    /// Invoke every callback registered for `topic`. The jobs lock is not
    /// held while callbacks run, since callbacks call back into the host.
    ///
    /// For `job.validate` the first error is returned and stops dispatch.
    /// For other topics errors are logged and dispatch continues.
    fn call_hooks(
        host: &Arc<Host>,
        topic: Topic,
        id: JobId,
        input: Value,
    ) -> Result<(), HookError> {
        let ctx: Arc<dyn Jobtap> = host.clone();
        let args = HookArgs::new(topic, id, input);

        for plugin in &host.plugins {
            for handler in plugin.handlers_for(topic) {
                match (handler.callback)(&ctx, &args) {
                    Ok(()) => {}
                    Err(e) if topic == Topic::Validate => return Err(e),
                    Err(e) => {
                        warn!(
                            plugin = plugin.name,
                            topic = %topic,
                            job_id = %id,
                            error = %e,
                            "Plugin callback failed"
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

impl Jobtap for Host {
    fn instance_owner(&self) -> UserId {
        self.owner
    }

    fn aux_get(&self, job: JobId, key: &str) -> Option<AuxValue> {
        self.jobs().get(&job).and_then(|j| j.aux_get(key))
    }

    fn aux_set(&self, job: JobId, key: &str, value: AuxValue) -> Result<(), JobtapError> {
        self.with_job_mut(job, |j| j.aux_set(key, value))
    }

    fn set_flag(&self, job: JobId, flag: &str) -> Result<(), JobtapError> {
        self.with_job_mut(job, |j| j.set_flag(flag))?;
        debug!(job_id = %job, flag, "Flag set");
        Ok(())
    }

    fn post_event(
        &self,
        job: JobId,
        name: &str,
        context: Option<Value>,
    ) -> Result<(), JobtapError> {
        if !event_names::is_known(name) {
            return Err(JobtapError::UnknownEvent(name.to_string()));
        }

        let event = JobEvent::new(job, name, context);
        self.with_job_mut(job, |j| {
            j.record_event(event.clone());
            Ok(())
        })?;

        debug!(job_id = %job, event = name, "Event posted");
        // No subscribers is not an error.
        let _ = self.events.send(event);
        Ok(())
    }

    fn raise_exception(
        &self,
        job: JobId,
        kind: &str,
        severity: u8,
        note: &str,
    ) -> Result<(), JobtapError> {
        warn!(job_id = %job, kind, severity, note, "Job exception");
        self.post_typed(
            job,
            event_names::EXCEPTION,
            &ExceptionContext::new(kind, severity, note),
        )
    }

    fn kvs(&self) -> Arc<dyn KvsClient> {
        self.kvs.clone()
    }

    fn spawn(&self, job: JobId, task: BoxFuture<'static, ()>) -> Result<(), JobtapError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| JobtapError::NoReactor)?;
        let handle = runtime.spawn(task);
        self.tasks().entry(job).or_default().push(handle);
        Ok(())
    }
}
