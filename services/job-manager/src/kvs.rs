//! KVS client interface and in-memory implementation.
//!
//! The KVS holds job records under `job.<dothex id>.<name>` keys. Writes
//! are grouped in a [`KvsTxn`] and committed atomically. Key validation
//! happens when the transaction is built, so a bad key is reported
//! synchronously and never reaches a commit.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// KVS errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KvsError {
    /// The key is empty or has an empty path component.
    #[error("invalid KVS key '{0}'")]
    InvalidKey(String),

    /// The commit did not complete.
    #[error("commit failed: {0}")]
    CommitFailed(String),
}

/// A batch of writes committed atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvsTxn {
    ops: Vec<(String, String)>,
}

impl KvsTxn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a put of `value` at `key`.
    pub fn put(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), KvsError> {
        let key = key.into();
        if key.is_empty() || key.split('.').any(str::is_empty) {
            return Err(KvsError::InvalidKey(key));
        }
        self.ops.push((key, value.into()));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// KVS client interface.
#[async_trait]
pub trait KvsClient: Send + Sync {
    /// Commit a transaction. Resolves once the writes are durable.
    async fn commit(&self, txn: KvsTxn) -> Result<(), KvsError>;
}

/// In-memory KVS for testing and single-process use.
pub struct MemoryKvs {
    /// Committed values.
    store: Mutex<BTreeMap<String, String>>,

    /// Simulated commit latency.
    latency: Duration,

    /// Whether commits should "fail".
    fail_commits: bool,

    /// Number of successful commits.
    commits: AtomicU64,
}

impl MemoryKvs {
    /// Create an empty in-memory KVS.
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Create an in-memory KVS whose commits take `latency` to complete.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            store: Mutex::new(BTreeMap::new()),
            latency,
            fail_commits: false,
            commits: AtomicU64::new(0),
        }
    }

    /// Create an in-memory KVS that fails every commit.
    pub fn failing() -> Self {
        Self {
            fail_commits: true,
            ..Self::new()
        }
    }

    /// Read a committed value.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.store.lock().await.get(key).cloned()
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }
}

impl Default for MemoryKvs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvsClient for MemoryKvs {
    async fn commit(&self, txn: KvsTxn) -> Result<(), KvsError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.fail_commits {
            return Err(KvsError::CommitFailed(
                "in-memory KVS configured to fail".to_string(),
            ));
        }

        let mut store = self.store.lock().await;
        for (key, value) in txn.ops {
            debug!(key = %key, bytes = value.len(), "KVS put");
            store.insert(key, value);
        }
        let seq = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        info!(seq, "KVS commit complete");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txn_rejects_bad_keys() {
        let mut txn = KvsTxn::new();
        assert!(matches!(txn.put("", "x"), Err(KvsError::InvalidKey(_))));
        assert!(matches!(txn.put("job..R", "x"), Err(KvsError::InvalidKey(_))));
        assert!(matches!(txn.put("job.R.", "x"), Err(KvsError::InvalidKey(_))));
        assert!(txn.is_empty());
    }

    #[tokio::test]
    async fn test_commit_applies_all_ops() {
        let kvs = MemoryKvs::new();
        let mut txn = KvsTxn::new();
        txn.put("job.0000.0000.0000.0001.R", "{}").unwrap();
        txn.put("job.0000.0000.0000.0001.jobspec", "{}").unwrap();
        assert_eq!(txn.len(), 2);

        kvs.commit(txn).await.unwrap();

        assert_eq!(
            kvs.get("job.0000.0000.0000.0001.R").await.as_deref(),
            Some("{}")
        );
        assert_eq!(kvs.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_commit_writes_nothing() {
        let kvs = MemoryKvs::failing();
        let mut txn = KvsTxn::new();
        txn.put("job.0000.0000.0000.0001.R", "{}").unwrap();

        let err = kvs.commit(txn).await.unwrap_err();
        assert!(matches!(err, KvsError::CommitFailed(_)));
        assert!(kvs.get("job.0000.0000.0000.0001.R").await.is_none());
        assert_eq!(kvs.commit_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_latency() {
        let kvs = MemoryKvs::with_latency(Duration::from_secs(2));
        let start = tokio::time::Instant::now();
        kvs.commit(KvsTxn::new()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
