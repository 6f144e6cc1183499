//! # jobtap-events
//!
//! Eventlog entry definitions for jobs managed by the jobtap job manager.
//!
//! ## Design Principles
//!
//! - Events are immutable records of job lifecycle transitions
//! - Every event belongs to exactly one job
//! - Event names are short verbs (`alloc`, `free`) shared with all observers
//! - Context payloads are optional and typed per event name
//!
//! ## Event Types
//!
//! - `submit`: the job was accepted
//! - `alloc`: resources were granted (by the scheduler, or by a bypass)
//! - `start` / `finish`: the job ran
//! - `free`: resources were released
//! - `clean`: cleanup finished; the job is inactive
//! - `exception`: a job-scoped failure was raised

mod entry;
mod error;
mod types;

pub use entry::*;
pub use error::EventError;
pub use types::*;
