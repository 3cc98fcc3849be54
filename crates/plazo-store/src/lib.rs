//! Case storage: the narrow read/write surface the deadline core needs.
//!
//! The core reads a case's status and dates, and writes a status change
//! together with its audit event. Every write is a guarded transition: it only
//! applies when the case is still in one of the expected statuses, and the
//! status and event land together or not at all.

mod error;
mod memory;

#[cfg(feature = "duckdb")]
mod duck;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use plazo_core::{CaseEvent, CaseEventType, CaseRecord, CaseStatus};

pub use error::StoreError;
pub use memory::MemoryCaseStore;

#[cfg(feature = "duckdb")]
pub use duck::DuckCaseStore;

/// A status change and the audit event that records it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub case_id: String,
    /// Statuses the case must currently be in for the change to apply.
    pub from: Vec<CaseStatus>,
    pub to: CaseStatus,
    pub event_type: CaseEventType,
    pub details: Option<String>,
    pub at: DateTime<Utc>,
}

/// Result of a guarded transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied(CaseEvent),
    /// The case had already moved on; nothing was written.
    Skipped { current: CaseStatus },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn get_case(&self, case_id: &str) -> Result<CaseRecord, StoreError>;

    /// Apply `transition` atomically if the current status is in `transition.from`.
    async fn commit_transition(
        &self,
        transition: &StatusTransition,
    ) -> Result<TransitionOutcome, StoreError>;

    /// Cases still waiting on the authority (`SUBMITTED` or `AWAITING_RESPONSE`).
    async fn open_cases(&self) -> Result<Vec<CaseRecord>, StoreError>;

    /// Audit events of a case, oldest first.
    async fn events(&self, case_id: &str) -> Result<Vec<CaseEvent>, StoreError>;
}

/// Timestamp for a new event, strictly after the case's previous one.
pub(crate) fn next_event_time(
    requested: DateTime<Utc>,
    last: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    match last {
        Some(last) if requested <= last => last + Duration::microseconds(1),
        _ => requested,
    }
}
