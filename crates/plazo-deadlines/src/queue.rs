//! In-process delayed execution on the tokio timer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::lifecycle::TriggerHandler;
use crate::scheduler::{DelayedExecutor, ScheduledTrigger};
use crate::ScheduleError;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<String, Pending>>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<String, Pending>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One tokio task per key, sleeping until its trigger is due.
///
/// Scheduling an existing key aborts the pending task and replaces it.
/// Handler failures that are transient are retried with linear backoff
/// (`backoff * attempt`) up to `max_attempts` runs in total.
pub struct TokioDelayQueue {
    handler: Arc<dyn TriggerHandler>,
    max_attempts: u32,
    backoff: Duration,
    pending: PendingMap,
    generation: AtomicU64,
}

impl TokioDelayQueue {
    pub fn new(handler: Arc<dyn TriggerHandler>, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            handler,
            max_attempts: max_attempts.max(1),
            backoff,
            pending: Arc::default(),
            generation: AtomicU64::new(0),
        }
    }

    /// Keys with a trigger still waiting or running, sorted.
    pub fn pending(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.pending).keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drop the trigger registered under `key`. Returns whether one existed.
    pub fn cancel(&self, key: &str) -> bool {
        match lock(&self.pending).remove(key) {
            Some(entry) => {
                entry.handle.abort();
                debug!(key, "cancelled trigger");
                true
            }
            None => false,
        }
    }

    /// Abort every pending trigger.
    pub fn shutdown(&self) {
        for (_, entry) in lock(&self.pending).drain() {
            entry.handle.abort();
        }
    }
}

impl Drop for TokioDelayQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[async_trait]
impl DelayedExecutor for TokioDelayQueue {
    async fn schedule_delayed(
        &self,
        key: &str,
        delay: Duration,
        trigger: ScheduledTrigger,
    ) -> Result<(), ScheduleError> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let handler = self.handler.clone();
        let pending = self.pending.clone();
        let max_attempts = self.max_attempts;
        let backoff = self.backoff;
        let task_key = key.to_string();

        let mut map = lock(&self.pending);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            run_with_retry(&*handler, &trigger, max_attempts, backoff).await;

            let mut map = lock(&pending);
            if map.get(&task_key).is_some_and(|p| p.generation == generation) {
                map.remove(&task_key);
            }
        });
        if let Some(previous) = map.insert(key.to_string(), Pending { generation, handle }) {
            previous.handle.abort();
            debug!(key, "replaced pending trigger");
        }
        debug!(key, ?delay, "trigger scheduled");
        Ok(())
    }
}

async fn run_with_retry(
    handler: &dyn TriggerHandler,
    trigger: &ScheduledTrigger,
    max_attempts: u32,
    backoff: Duration,
) {
    let key = trigger.key();
    for attempt in 1..=max_attempts {
        match handler.handle(trigger, Utc::now()).await {
            Ok(_) => return,
            Err(e) if e.is_transient() && attempt < max_attempts => {
                warn!(key = %key, attempt, error = %e, "trigger failed, retrying");
                tokio::time::sleep(backoff * attempt).await;
            }
            Err(e) => {
                error!(key = %key, attempt, error = %e, "trigger abandoned");
                return;
            }
        }
    }
}
