use crate::job::ApplyJob;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Shared job store: the outer lock guards only map structure, each job
/// has its own lock so concurrent jobs never contend with each other.
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<RwLock<ApplyJob>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, job: ApplyJob) -> Arc<RwLock<ApplyJob>> {
        let slot = Arc::new(RwLock::new(job));
        let job_id = slot.read().await.job_id.clone();
        self.jobs.write().await.insert(job_id, Arc::clone(&slot));
        slot
    }

    pub async fn get(&self, job_id: &str) -> Option<Arc<RwLock<ApplyJob>>> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Point-in-time copy, detached from further job mutation.
    pub async fn snapshot(&self, job_id: &str) -> Option<ApplyJob> {
        let slot = self.get(job_id).await?;
        let job = slot.read().await;
        Some(job.clone())
    }

    pub async fn list(&self) -> Vec<ApplyJob> {
        let slots: Vec<Arc<RwLock<ApplyJob>>> =
            self.jobs.read().await.values().cloned().collect();
        let mut jobs = Vec::with_capacity(slots.len());
        for slot in slots {
            jobs.push(slot.read().await.clone());
        }
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-camera exclusivity locks. The table lock is held only to fetch
/// or create an entry; acquisition itself is per-key, so cameras never
/// serialize behind each other.
pub struct CameraLockTable {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl CameraLockTable {
    pub fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Non-blocking: returns `None` when the camera already has an
    /// active holder, which callers surface as a busy error rather
    /// than queueing.
    pub async fn try_acquire(&self, camera_id: &str) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.write().await;
            Arc::clone(
                locks
                    .entry(camera_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.try_lock_owned().ok()
    }
}

impl Default for CameraLockTable {
    fn default() -> Self {
        Self::new()
    }
}
