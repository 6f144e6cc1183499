//! Built-in jobtap plugins.

pub mod alloc_bypass;

use crate::jobtap::Plugin;

/// Plugins loaded by default.
pub fn builtin() -> Vec<Plugin> {
    vec![alloc_bypass::plugin()]
}
