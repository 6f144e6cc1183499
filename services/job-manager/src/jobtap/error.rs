//! Error types for the jobtap host interface.

use jobtap_events::EventError;
use jobtap_id::JobId;
use thiserror::Error;

use super::Topic;

/// Errors returned by host operations invoked from plugins.
#[derive(Debug, Error)]
pub enum JobtapError {
    /// No job with this ID exists.
    #[error("unknown job {0}")]
    UnknownJob(JobId),

    /// The job has finished cleanup and no longer accepts changes.
    #[error("job {0} is inactive")]
    Inactive(JobId),

    /// Annotations are set once; the key is already present.
    #[error("job {job}: annotation '{key}' is already set")]
    AuxExists { job: JobId, key: String },

    /// The flag is not one the job manager understands.
    #[error("unknown flag '{0}'")]
    UnknownFlag(String),

    /// The event name is not one the job manager understands.
    #[error("unknown event name '{0}'")]
    UnknownEvent(String),

    /// No reactor is available to run asynchronous plugin work.
    #[error("no reactor available to run plugin task")]
    NoReactor,

    /// Event encoding failed.
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Hook argument decoding failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ArgsError(pub String);

/// Result of a hook callback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HookError {
    /// The job is rejected at submission. Only meaningful for `job.validate`.
    #[error("{0}")]
    Rejected(String),

    /// The callback failed; the host logs it and continues.
    #[error("{topic}: {message}")]
    Failed { topic: Topic, message: String },
}

impl HookError {
    pub fn reject(reason: impl Into<String>) -> Self {
        HookError::Rejected(reason.into())
    }

    pub fn failed(topic: Topic, message: impl Into<String>) -> Self {
        HookError::Failed {
            topic,
            message: message.into(),
        }
    }
}
