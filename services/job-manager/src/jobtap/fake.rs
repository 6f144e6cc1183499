//! In-process fake of the jobtap host for plugin unit tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use jobtap_id::{JobId, UserId};
use serde_json::Value;

use super::{AuxValue, Jobtap, JobtapError};
use crate::kvs::{KvsClient, MemoryKvs};

/// A recorded exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaisedException {
    pub job: JobId,
    pub kind: String,
    pub severity: u8,
    pub note: String,
}

/// Fake host that records everything plugins do.
///
/// Spawned tasks are queued rather than run, so a test controls exactly
/// when asynchronous work resolves.
pub struct FakeJobtap {
    owner: UserId,
    kvs: Arc<MemoryKvs>,
    aux: Mutex<HashMap<(JobId, String), AuxValue>>,
    flags: Mutex<BTreeSet<(JobId, String)>>,
    events: Mutex<Vec<(JobId, String, Option<Value>)>>,
    exceptions: Mutex<Vec<RaisedException>>,
    spawned: Mutex<Vec<BoxFuture<'static, ()>>>,

    pub fail_flags: AtomicBool,
    pub fail_posts: AtomicBool,
    pub fail_spawn: AtomicBool,
}

impl FakeJobtap {
    pub fn new(owner: u32) -> Arc<Self> {
        Self::with_kvs(owner, MemoryKvs::new())
    }

    pub fn with_kvs(owner: u32, kvs: MemoryKvs) -> Arc<Self> {
        Arc::new(Self {
            owner: UserId::new(owner),
            kvs: Arc::new(kvs),
            aux: Mutex::default(),
            flags: Mutex::default(),
            events: Mutex::default(),
            exceptions: Mutex::default(),
            spawned: Mutex::default(),
            fail_flags: AtomicBool::new(false),
            fail_posts: AtomicBool::new(false),
            fail_spawn: AtomicBool::new(false),
        })
    }

    /// The same fake as a plugin sees it.
    pub fn ctx(self: &Arc<Self>) -> Arc<dyn Jobtap> {
        self.clone()
    }

    pub fn memory_kvs(&self) -> &MemoryKvs {
        &self.kvs
    }

    pub fn has_flag(&self, job: JobId, flag: &str) -> bool {
        self.flags.lock().unwrap().contains(&(job, flag.to_string()))
    }

    /// Names of events posted to `job`, in order.
    pub fn event_names(&self, job: JobId) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| *id == job)
            .map(|(_, name, _)| name.clone())
            .collect()
    }

    pub fn events(&self) -> Vec<(JobId, String, Option<Value>)> {
        self.events.lock().unwrap().clone()
    }

    pub fn exceptions(&self) -> Vec<RaisedException> {
        self.exceptions.lock().unwrap().clone()
    }

    pub fn spawned_count(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }

    /// Run every queued task to completion.
    pub async fn run_spawned(&self) {
        let tasks: Vec<_> = std::mem::take(&mut *self.spawned.lock().unwrap());
        for task in tasks {
            task.await;
        }
    }

    /// Drop every queued task without running it.
    pub fn cancel_spawned(&self) {
        self.spawned.lock().unwrap().clear();
    }
}

impl Jobtap for FakeJobtap {
    fn instance_owner(&self) -> UserId {
        self.owner
    }

    fn aux_get(&self, job: JobId, key: &str) -> Option<AuxValue> {
        self.aux.lock().unwrap().get(&(job, key.to_string())).cloned()
    }

    fn aux_set(&self, job: JobId, key: &str, value: AuxValue) -> Result<(), JobtapError> {
        let mut aux = self.aux.lock().unwrap();
        let key = (job, key.to_string());
        if aux.contains_key(&key) {
            return Err(JobtapError::AuxExists { job, key: key.1 });
        }
        aux.insert(key, value);
        Ok(())
    }

    fn set_flag(&self, job: JobId, flag: &str) -> Result<(), JobtapError> {
        if self.fail_flags.load(Ordering::SeqCst) {
            return Err(JobtapError::UnknownFlag(flag.to_string()));
        }
        self.flags.lock().unwrap().insert((job, flag.to_string()));
        Ok(())
    }

    fn post_event(
        &self,
        job: JobId,
        name: &str,
        context: Option<Value>,
    ) -> Result<(), JobtapError> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(JobtapError::Inactive(job));
        }
        self.events
            .lock()
            .unwrap()
            .push((job, name.to_string(), context));
        Ok(())
    }

    fn raise_exception(
        &self,
        job: JobId,
        kind: &str,
        severity: u8,
        note: &str,
    ) -> Result<(), JobtapError> {
        self.exceptions.lock().unwrap().push(RaisedException {
            job,
            kind: kind.to_string(),
            severity,
            note: note.to_string(),
        });
        Ok(())
    }

    fn kvs(&self) -> Arc<dyn KvsClient> {
        self.kvs.clone()
    }

    fn spawn(&self, _job: JobId, task: BoxFuture<'static, ()>) -> Result<(), JobtapError> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(JobtapError::NoReactor);
        }
        self.spawned.lock().unwrap().push(task);
        Ok(())
    }
}
