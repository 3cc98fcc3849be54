//! In-process case store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use plazo_core::{CaseEvent, CaseRecord};
use tracing::debug;

use crate::{CaseStore, StatusTransition, StoreError, TransitionOutcome, next_event_time};

#[derive(Default)]
struct Tables {
    cases: HashMap<String, CaseRecord>,
    events: HashMap<String, Vec<CaseEvent>>,
}

/// Mutex-protected case store. Each transition holds the lock for its whole
/// check-and-write, so status and event are always written together.
#[derive(Default)]
pub struct MemoryCaseStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl MemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly filed case.
    pub fn insert(&self, case: CaseRecord) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tables = self.lock();
        if tables.cases.contains_key(&case.id) {
            return Err(StoreError::CaseExists(case.id));
        }
        tables.cases.insert(case.id.clone(), case);
        Ok(())
    }

    /// Make every call fail with [`StoreError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".into()))
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CaseStore for MemoryCaseStore {
    async fn get_case(&self, case_id: &str) -> Result<CaseRecord, StoreError> {
        self.check_available()?;
        self.lock()
            .cases
            .get(case_id)
            .cloned()
            .ok_or_else(|| StoreError::CaseNotFound(case_id.to_string()))
    }

    async fn commit_transition(
        &self,
        transition: &StatusTransition,
    ) -> Result<TransitionOutcome, StoreError> {
        self.check_available()?;
        let mut guard = self.lock();
        let tables = &mut *guard;

        let case = tables
            .cases
            .get_mut(&transition.case_id)
            .ok_or_else(|| StoreError::CaseNotFound(transition.case_id.clone()))?;
        if !transition.from.contains(&case.status) {
            debug!(
                case_id = %transition.case_id,
                current = %case.status,
                wanted = %transition.to,
                "transition skipped"
            );
            return Ok(TransitionOutcome::Skipped {
                current: case.status,
            });
        }

        let events = tables.events.entry(transition.case_id.clone()).or_default();
        let event = CaseEvent {
            case_id: transition.case_id.clone(),
            event_type: transition.event_type,
            details: transition.details.clone(),
            created_at: next_event_time(transition.at, events.last().map(|e| e.created_at)),
        };
        case.status = transition.to;
        events.push(event.clone());
        Ok(TransitionOutcome::Applied(event))
    }

    async fn open_cases(&self) -> Result<Vec<CaseRecord>, StoreError> {
        self.check_available()?;
        let mut open: Vec<CaseRecord> = self
            .lock()
            .cases
            .values()
            .filter(|c| !c.status.is_terminal())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(open)
    }

    async fn events(&self, case_id: &str) -> Result<Vec<CaseEvent>, StoreError> {
        self.check_available()?;
        let tables = self.lock();
        if !tables.cases.contains_key(case_id) {
            return Err(StoreError::CaseNotFound(case_id.to_string()));
        }
        Ok(tables.events.get(case_id).cloned().unwrap_or_default())
    }
}
