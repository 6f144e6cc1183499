//! jobtap job manager.
//!
//! An in-process job manager that drives jobs through their lifecycle and
//! hosts jobtap plugins, together with the built-in alloc-bypass plugin.

pub mod config;
pub mod job;
pub mod jobtap;
pub mod kvs;
pub mod manager;
pub mod plugins;

pub use manager::{JobManager, JobManagerError, SchedOutcome};
