//! Event names and typed context payloads.
//!
//! Each event with a context has a payload struct here. Events without a
//! context (`free`, `clean`, `start`) carry `None`.

use serde::{Deserialize, Serialize};

// =============================================================================
// Event Name Constants
// =============================================================================

/// All event names as constants.
pub mod event_names {
    pub const SUBMIT: &str = "submit";
    pub const ALLOC: &str = "alloc";
    pub const START: &str = "start";
    pub const FINISH: &str = "finish";
    pub const FREE: &str = "free";
    pub const CLEAN: &str = "clean";
    pub const EXCEPTION: &str = "exception";

    /// Every event name the job manager understands.
    pub const ALL: &[&str] = &[SUBMIT, ALLOC, START, FINISH, FREE, CLEAN, EXCEPTION];

    /// Returns true if `name` is a known event name.
    pub fn is_known(name: &str) -> bool {
        ALL.contains(&name)
    }
}

// =============================================================================
// Context Payloads
// =============================================================================

/// Context for `submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitContext {
    pub userid: u32,
}

/// Context for `alloc`.
///
/// `bypass` is only present when the grant did not come from the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocContext {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bypass: bool,
}

impl AllocContext {
    /// Context for a grant synthesized outside scheduler negotiation.
    pub fn bypass() -> Self {
        Self { bypass: true }
    }
}

/// Context for `finish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishContext {
    /// Wait status of the job shell.
    pub status: i32,
}

/// Severity 0 is fatal: the job is failed in the named phase.
pub const SEVERITY_FATAL: u8 = 0;

/// Context for `exception`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionContext {
    /// Phase or category of the failure (e.g. "alloc").
    #[serde(rename = "type")]
    pub kind: String,

    pub severity: u8,

    pub note: String,
}

impl ExceptionContext {
    pub fn new(kind: impl Into<String>, severity: u8, note: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            severity,
            note: note.into(),
        }
    }

    /// Returns true if this exception fails the job.
    pub fn is_fatal(&self) -> bool {
        self.severity == SEVERITY_FATAL
    }
}
