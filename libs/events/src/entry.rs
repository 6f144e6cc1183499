//! Eventlog entry - one observable lifecycle transition of a job.

use chrono::{DateTime, Utc};
use jobtap_id::JobId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{event_names, AllocContext, EventError};

/// A single job eventlog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    /// The job this event belongs to.
    pub id: JobId,

    /// When the event was posted.
    pub timestamp: DateTime<Utc>,

    /// Event name (e.g. "alloc", "free").
    pub name: String,

    /// Event-specific context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl JobEvent {
    /// Creates an event stamped with the current time.
    pub fn new(id: JobId, name: impl Into<String>, context: Option<serde_json::Value>) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            name: name.into(),
            context,
        }
    }

    /// Creates an event with a typed context.
    pub fn with_context<C: Serialize>(
        id: JobId,
        name: impl Into<String>,
        context: &C,
    ) -> Result<Self, EventError> {
        Ok(Self::new(id, name, Some(serde_json::to_value(context)?)))
    }

    /// Decodes the context as `C`.
    pub fn context_as<C: DeserializeOwned>(&self) -> Result<C, EventError> {
        let value = self.context.clone().ok_or_else(|| EventError::InvalidContext {
            name: self.name.clone(),
            message: "missing context".to_string(),
        })?;
        serde_json::from_value(value).map_err(|e| EventError::InvalidContext {
            name: self.name.clone(),
            message: e.to_string(),
        })
    }

    /// Returns true if this is an `alloc` event synthesized by a bypass.
    pub fn is_bypass_alloc(&self) -> bool {
        self.name == event_names::ALLOC
            && self
                .context_as::<AllocContext>()
                .map(|ctx| ctx.bypass)
                .unwrap_or(false)
    }

    /// Serializes the event as a single JSON line.
    pub fn to_json_line(&self) -> Result<String, EventError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExceptionContext;

    #[test]
    fn test_bypass_alloc_detection() {
        let id = JobId::new(7);
        let bypass = JobEvent::with_context(id, "alloc", &AllocContext::bypass()).unwrap();
        assert!(bypass.is_bypass_alloc());

        let negotiated = JobEvent::new(id, "alloc", None);
        assert!(!negotiated.is_bypass_alloc());

        let free = JobEvent::new(id, "free", None);
        assert!(!free.is_bypass_alloc());
    }

    #[test]
    fn test_context_as_missing_context() {
        let event = JobEvent::new(JobId::new(1), "exception", None);
        let err = event.context_as::<ExceptionContext>().unwrap_err();
        assert!(matches!(err, EventError::InvalidContext { .. }));
    }

    #[test]
    fn test_json_line_omits_empty_context() {
        let event = JobEvent::new(JobId::new(3), "free", None);
        let line = event.to_json_line().unwrap();
        assert!(!line.contains("context"));
        assert!(line.contains("\"id\":3"));

        let parsed: JobEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.name, "free");
        assert!(parsed.context.is_none());
    }
}
