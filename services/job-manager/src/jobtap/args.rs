//! Hook topics and arguments.

use jobtap_id::JobId;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::ArgsError;

/// Lifecycle points at which plugin callbacks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Submission, before the job exists. Callbacks may reject the job.
    Validate,
    /// The job entered the scheduling state.
    Sched,
    /// The job entered cleanup.
    Cleanup,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Validate => "job.validate",
            Topic::Sched => "job.state.sched",
            Topic::Cleanup => "job.state.cleanup",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments passed to a hook callback.
#[derive(Debug, Clone)]
pub struct HookArgs {
    topic: Topic,
    job: JobId,
    input: Value,
}

impl HookArgs {
    pub fn new(topic: Topic, job: JobId, input: Value) -> Self {
        Self { topic, job, input }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// The job this callback fires for.
    pub fn job(&self) -> JobId {
        self.job
    }

    /// Decode the input payload. Unknown fields are ignored.
    pub fn unpack<T: DeserializeOwned>(&self) -> Result<T, ArgsError> {
        T::deserialize(&self.input).map_err(|e| ArgsError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        id: JobId,
    }

    #[test]
    fn test_topic_names() {
        assert_eq!(Topic::Validate.to_string(), "job.validate");
        assert_eq!(Topic::Sched.to_string(), "job.state.sched");
        assert_eq!(Topic::Cleanup.to_string(), "job.state.cleanup");
    }

    #[test]
    fn test_unpack() {
        let args = HookArgs::new(
            Topic::Sched,
            JobId::new(5),
            serde_json::json!({"id": 5, "priority": 16}),
        );
        let payload: Payload = args.unpack().unwrap();
        assert_eq!(payload.id, JobId::new(5));
    }

    #[test]
    fn test_unpack_error_message() {
        let args = HookArgs::new(Topic::Sched, JobId::new(5), serde_json::json!({"id": "five"}));
        let err = args.unpack::<Payload>().unwrap_err();
        assert!(err.to_string().contains("invalid type"), "{err}");
    }
}
