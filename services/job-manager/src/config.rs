use std::time::Duration;

use anyhow::{Context, Result};
use jobtap_id::UserId;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Only this user may bypass scheduler negotiation.
    pub instance_owner: UserId,
    pub kvs_commit_latency: Duration,
    pub drain_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let log_level = std::env::var("JOBTAP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let instance_owner = match std::env::var("JOBTAP_INSTANCE_OWNER") {
            Ok(v) => UserId::new(
                v.parse()
                    .with_context(|| format!("invalid JOBTAP_INSTANCE_OWNER '{v}'"))?,
            ),
            Err(_) => process_uid(),
        };

        let kvs_commit_latency = Duration::from_millis(
            std::env::var("JOBTAP_KVS_COMMIT_LATENCY_MS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .context("invalid JOBTAP_KVS_COMMIT_LATENCY_MS")?,
        );

        let drain_timeout = Duration::from_secs(
            std::env::var("JOBTAP_DRAIN_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("invalid JOBTAP_DRAIN_TIMEOUT_SECS")?,
        );

        Ok(Self {
            log_level,
            instance_owner,
            kvs_commit_latency,
            drain_timeout,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            instance_owner: process_uid(),
            kvs_commit_latency: Duration::ZERO,
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// Real uid of this process.
pub fn process_uid() -> UserId {
    UserId::new(unsafe { libc::getuid() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.instance_owner, process_uid());
        assert_eq!(config.drain_timeout, Duration::from_secs(10));
        assert!(config.kvs_commit_latency.is_zero());
    }
}
