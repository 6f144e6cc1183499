//! Jobtap: the plugin interface of the job manager.
//!
//! Plugins register callbacks against job lifecycle topics. The job manager
//! invokes them synchronously at the matching point in a job's life and hands
//! them a [`Jobtap`] handle for everything they may do in return:
//!
//! - read and set per-job annotations (the only state shared between hooks)
//! - set scheduler flags
//! - post events to the job's eventlog
//! - raise job exceptions
//! - start asynchronous work (KVS commits) owned by the job
//!
//! Hooks never block. Work that must wait is handed to [`Jobtap::spawn`],
//! and the job manager resolves it before the job reaches cleanup.

mod args;
mod error;
#[cfg(test)]
pub(crate) mod fake;

use std::any::Any;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use jobtap_id::{JobId, UserId};
use serde_json::Value;

use crate::kvs::KvsClient;

pub use args::{HookArgs, Topic};
pub use error::{ArgsError, HookError, JobtapError};

/// An annotation value. The value is dropped with the job record.
pub type AuxValue = Arc<dyn Any + Send + Sync>;

/// Hook callback signature.
pub type HookFn = fn(&Arc<dyn Jobtap>, &HookArgs) -> Result<(), HookError>;

/// One entry of a plugin's registration table.
#[derive(Debug, Clone, Copy)]
pub struct Handler {
    pub topic: Topic,
    pub callback: HookFn,
}

/// A named registration table.
#[derive(Debug, Clone, Copy)]
pub struct Plugin {
    pub name: &'static str,
    pub handlers: &'static [Handler],
}

impl Plugin {
    /// Handlers registered for `topic`, in table order.
    pub fn handlers_for(&self, topic: Topic) -> impl Iterator<Item = &Handler> + '_ {
        self.handlers.iter().filter(move |h| h.topic == topic)
    }
}

/// Host operations available to plugin callbacks.
pub trait Jobtap: Send + Sync + 'static {
    /// The user the job manager instance runs as.
    fn instance_owner(&self) -> UserId;

    /// Look up a job annotation.
    fn aux_get(&self, job: JobId, key: &str) -> Option<AuxValue>;

    /// Set a job annotation. Fails if the key is already set.
    fn aux_set(&self, job: JobId, key: &str, value: AuxValue) -> Result<(), JobtapError>;

    /// Set a scheduler flag on a job.
    fn set_flag(&self, job: JobId, flag: &str) -> Result<(), JobtapError>;

    /// Post an event to the job's eventlog.
    fn post_event(&self, job: JobId, name: &str, context: Option<Value>)
        -> Result<(), JobtapError>;

    /// Raise a job exception. Severity 0 fails the job.
    fn raise_exception(
        &self,
        job: JobId,
        kind: &str,
        severity: u8,
        note: &str,
    ) -> Result<(), JobtapError>;

    /// The KVS client for this instance.
    fn kvs(&self) -> Arc<dyn KvsClient>;

    /// Run `task` on the reactor. The job does not reach cleanup until the
    /// task has finished.
    fn spawn(&self, job: JobId, task: BoxFuture<'static, ()>) -> Result<(), JobtapError>;
}

impl dyn Jobtap {
    /// Look up an annotation and downcast it.
    pub fn aux_get_as<T: Any + Send + Sync>(&self, job: JobId, key: &str) -> Option<Arc<T>> {
        self.aux_get(job, key)
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// Returns true if the annotation is present.
    pub fn aux_contains(&self, job: JobId, key: &str) -> bool {
        self.aux_get(job, key).is_some()
    }
}
