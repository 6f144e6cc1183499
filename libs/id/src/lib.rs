//! # jobtap-id
//!
//! Identifier types shared by the jobtap job manager and its plugins.
//!
//! ## Design Principles
//!
//! - Job IDs are issued by the job manager, monotonically, and never reused
//! - All IDs have a canonical string representation with strict parsing
//! - IDs are typed so a job ID can never be passed where a user ID is expected
//!
//! ## Job ID Formats
//!
//! A job ID is a 64-bit integer. It renders as:
//!
//! - decimal: `1234567890`
//! - hex: `0x499602d2`
//! - dothex: `0000.0000.4996.02d2` (four dot-separated 16-bit groups)
//!
//! The dothex form is used to build KVS keys, e.g. `job.0000.0000.4996.02d2.R`.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;
