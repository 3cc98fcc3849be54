//! Guarded status transitions driven by triggers, responses and the sweep.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use plazo_core::{CaseEventType, CaseRecord, CaseStatus, TriggerKind};
use plazo_store::{CaseStore, StatusTransition, StoreError, TransitionOutcome};
use tracing::{debug, error, info, warn};

use crate::scheduler::{DeadlineCalculator, ScheduledTrigger, start_of_day};
use crate::LifecycleError;

const WARNING_FROM: &[CaseStatus] = &[CaseStatus::Submitted];
const EXPIRATION_FROM: &[CaseStatus] = &CaseStatus::OPEN;
const RESPONSE_FROM: &[CaseStatus] = &[
    CaseStatus::Submitted,
    CaseStatus::AwaitingResponse,
    CaseStatus::Escalated,
];

const DEFAULT_RESPONSE_NOTE: &str = "Respuesta de la autoridad recibida.";

/// Runs a fired trigger. Implementations must tolerate duplicate delivery.
#[async_trait]
pub trait TriggerHandler: Send + Sync {
    async fn handle(
        &self,
        trigger: &ScheduledTrigger,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, LifecycleError>;
}

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Open cases examined.
    pub scanned: usize,
    /// Cases this pass moved to `ESCALATED`.
    pub escalated: usize,
    /// Overdue cases another writer had already moved on.
    pub skipped: usize,
    /// Cases whose escalation failed; they are retried on the next pass.
    pub failed: usize,
}

/// Applies the case lifecycle rules against a [`CaseStore`].
///
/// Every transition re-reads the case and commits through the store's status
/// guard, so repeated or concurrent invocations write at most one event.
pub struct CaseLifecycleController {
    store: Arc<dyn CaseStore>,
    calculator: DeadlineCalculator,
    warning_lead_days: u32,
    store_timeout: Duration,
}

impl CaseLifecycleController {
    pub fn new(
        store: Arc<dyn CaseStore>,
        calculator: DeadlineCalculator,
        warning_lead_days: u32,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            calculator,
            warning_lead_days,
            store_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn CaseStore> {
        &self.store
    }

    /// Warning trigger: `SUBMITTED` becomes `AWAITING_RESPONSE`.
    pub async fn on_warning(
        &self,
        case_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        let details = format!(
            "Faltan {} días hábiles para que venza el plazo de respuesta.",
            self.warning_lead_days
        );
        self.transition(
            case_id,
            WARNING_FROM,
            CaseStatus::AwaitingResponse,
            CaseEventType::DeadlineWarning,
            details,
            now,
        )
        .await
    }

    /// Expiration trigger: an open case becomes `ESCALATED`.
    pub async fn on_expiration(
        &self,
        case_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        let details = format!(
            "El plazo de {} días hábiles venció sin respuesta de la autoridad. \
             Procede la acción de tutela.",
            self.calculator.response_days()
        );
        self.transition(
            case_id,
            EXPIRATION_FROM,
            CaseStatus::Escalated,
            CaseEventType::DeadlineExpired,
            details,
            now,
        )
        .await
    }

    /// The authority answered. Allowed from any status except `RESPONDED`.
    pub async fn on_response_received(
        &self,
        case_id: &str,
        now: DateTime<Utc>,
        details: Option<String>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        self.transition(
            case_id,
            RESPONSE_FROM,
            CaseStatus::Responded,
            CaseEventType::ResponseReceived,
            details.unwrap_or_else(|| DEFAULT_RESPONSE_NOTE.to_string()),
            now,
        )
        .await
    }

    /// Escalate every open case whose deadline has passed.
    ///
    /// Safe to run repeatedly and alongside trigger handlers.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, LifecycleError> {
        let open = self
            .open_cases()
            .await
            .inspect_err(|e| error!(error = %e, "sweep could not list open cases"))?;

        let mut report = SweepReport {
            scanned: open.len(),
            ..SweepReport::default()
        };
        for case in &open {
            let deadline = match self.deadline_of(case) {
                Ok(deadline) => deadline,
                Err(e) => {
                    warn!(case_id = %case.id, error = %e, "sweep cannot date case");
                    report.failed += 1;
                    continue;
                }
            };
            if start_of_day(deadline) >= now {
                continue;
            }
            match self.on_expiration(&case.id, now).await {
                Ok(TransitionOutcome::Applied(_)) => report.escalated += 1,
                Ok(TransitionOutcome::Skipped { .. }) => report.skipped += 1,
                Err(_) => report.failed += 1,
            }
        }

        info!(
            scanned = report.scanned,
            escalated = report.escalated,
            skipped = report.skipped,
            failed = report.failed,
            "sweep complete"
        );
        Ok(report)
    }

    /// Cases still waiting on the authority, within the store timeout.
    pub async fn open_cases(&self) -> Result<Vec<CaseRecord>, LifecycleError> {
        self.with_timeout("open_cases", self.store.open_cases()).await
    }

    fn deadline_of(&self, case: &CaseRecord) -> Result<NaiveDate, LifecycleError> {
        if let Some(deadline) = case.deadline_date {
            return Ok(deadline);
        }
        let submission = case
            .submission_date
            .ok_or_else(|| LifecycleError::MissingDates(case.id.clone()))?;
        Ok(self.calculator.compute(submission.date_naive())?.deadline_date)
    }

    async fn transition(
        &self,
        case_id: &str,
        from: &[CaseStatus],
        to: CaseStatus,
        event_type: CaseEventType,
        details: String,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        let result = self
            .try_transition(case_id, from, to, event_type, details, now)
            .await;
        match &result {
            Ok(TransitionOutcome::Applied(event)) => {
                info!(case_id, status = %to, event = %event.event_type, "case transitioned");
            }
            Ok(TransitionOutcome::Skipped { current }) => {
                debug!(case_id, %current, wanted = %to, "transition not applicable");
            }
            Err(e) => {
                error!(case_id, event = %event_type, error = %e, "transition failed");
            }
        }
        result
    }

    async fn try_transition(
        &self,
        case_id: &str,
        from: &[CaseStatus],
        to: CaseStatus,
        event_type: CaseEventType,
        details: String,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        let case = self
            .with_timeout("get_case", self.store.get_case(case_id))
            .await?;
        if !from.contains(&case.status) {
            return Ok(TransitionOutcome::Skipped {
                current: case.status,
            });
        }

        let transition = StatusTransition {
            case_id: case_id.to_string(),
            from: from.to_vec(),
            to,
            event_type,
            details: Some(details),
            at: now,
        };
        self.with_timeout("commit_transition", self.store.commit_transition(&transition))
            .await
    }

    async fn with_timeout<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, LifecycleError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(LifecycleError::Timeout {
                operation,
                timeout: self.store_timeout,
            }),
        }
    }
}

#[async_trait]
impl TriggerHandler for CaseLifecycleController {
    async fn handle(
        &self,
        trigger: &ScheduledTrigger,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        match trigger.kind {
            TriggerKind::Warning => self.on_warning(&trigger.case_id, now).await,
            TriggerKind::Expiration => self.on_expiration(&trigger.case_id, now).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use plazo_core::{BusinessDayClock, PolicyConfig};
    use plazo_store::MemoryCaseStore;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn controller_with(store: Arc<dyn CaseStore>, timeout: Duration) -> CaseLifecycleController {
        let policy = PolicyConfig::default();
        let calculator = DeadlineCalculator::new(BusinessDayClock::default(), &policy);
        CaseLifecycleController::new(store, calculator, policy.warning_lead_days, timeout)
    }

    fn setup() -> (Arc<MemoryCaseStore>, CaseLifecycleController) {
        let store = Arc::new(MemoryCaseStore::new());
        let controller = controller_with(store.clone(), Duration::from_secs(5));
        (store, controller)
    }

    /// Filed Monday 2026-03-02: warning 2026-03-18, deadline 2026-03-24.
    fn file_case(store: &MemoryCaseStore, id: &str) {
        store
            .insert(CaseRecord::submitted(id, ts(2026, 3, 2, 15), None))
            .unwrap();
    }

    async fn event_types(store: &MemoryCaseStore, id: &str) -> Vec<CaseEventType> {
        store
            .events(id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    #[tokio::test]
    async fn warning_then_expiration() {
        let (store, controller) = setup();
        file_case(&store, "c1");

        let warned = controller.on_warning("c1", ts(2026, 3, 18, 0)).await.unwrap();
        assert!(warned.is_applied());
        assert_eq!(
            store.get_case("c1").await.unwrap().status,
            CaseStatus::AwaitingResponse
        );

        let expired = controller
            .on_expiration("c1", ts(2026, 3, 24, 0))
            .await
            .unwrap();
        let TransitionOutcome::Applied(event) = expired else {
            panic!("expected escalation");
        };
        assert!(event.details.unwrap().contains("15 días hábiles"));
        assert_eq!(
            store.get_case("c1").await.unwrap().status,
            CaseStatus::Escalated
        );
        assert_eq!(
            event_types(&store, "c1").await,
            vec![CaseEventType::DeadlineWarning, CaseEventType::DeadlineExpired]
        );
    }

    #[tokio::test]
    async fn response_before_deadline_blocks_escalation() {
        let (store, controller) = setup();
        file_case(&store, "c1");

        controller.on_warning("c1", ts(2026, 3, 18, 0)).await.unwrap();
        controller
            .on_response_received("c1", ts(2026, 3, 20, 10), None)
            .await
            .unwrap();
        let expired = controller
            .on_expiration("c1", ts(2026, 3, 24, 0))
            .await
            .unwrap();

        assert_eq!(
            expired,
            TransitionOutcome::Skipped {
                current: CaseStatus::Responded
            }
        );
        assert_eq!(
            event_types(&store, "c1").await,
            vec![
                CaseEventType::DeadlineWarning,
                CaseEventType::ResponseReceived
            ]
        );
    }

    #[tokio::test]
    async fn warning_only_applies_to_submitted() {
        let (store, controller) = setup();
        file_case(&store, "c1");
        controller
            .on_response_received("c1", ts(2026, 3, 5, 9), Some("oficio 123".into()))
            .await
            .unwrap();

        let warned = controller.on_warning("c1", ts(2026, 3, 18, 0)).await.unwrap();
        assert!(!warned.is_applied());

        let events = store.events("c1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details.as_deref(), Some("oficio 123"));
    }

    #[tokio::test]
    async fn late_response_after_escalation_is_recorded() {
        let (store, controller) = setup();
        file_case(&store, "c1");
        controller.on_expiration("c1", ts(2026, 3, 24, 0)).await.unwrap();

        let responded = controller
            .on_response_received("c1", ts(2026, 3, 30, 9), None)
            .await
            .unwrap();
        assert!(responded.is_applied());
        assert!(
            !controller
                .on_response_received("c1", ts(2026, 3, 31, 9), None)
                .await
                .unwrap()
                .is_applied()
        );
        assert_eq!(
            store.get_case("c1").await.unwrap().status,
            CaseStatus::Responded
        );
    }

    #[tokio::test]
    async fn duplicate_triggers_write_one_event() {
        let (store, controller) = setup();
        file_case(&store, "c1");
        let trigger = ScheduledTrigger {
            case_id: "c1".into(),
            kind: TriggerKind::Expiration,
            fire_at: ts(2026, 3, 24, 0),
        };

        for _ in 0..3 {
            controller.handle(&trigger, ts(2026, 3, 24, 0)).await.unwrap();
        }
        assert_eq!(
            event_types(&store, "c1").await,
            vec![CaseEventType::DeadlineExpired]
        );
    }

    #[tokio::test]
    async fn missing_case_is_an_error() {
        let (_store, controller) = setup();
        let err = controller
            .on_warning("ghost", ts(2026, 3, 18, 0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Store(StoreError::CaseNotFound(_))
        ));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn unavailable_store_is_transient() {
        let (store, controller) = setup();
        file_case(&store, "c1");
        store.set_unavailable(true);

        let err = controller
            .on_expiration("c1", ts(2026, 3, 24, 0))
            .await
            .unwrap_err();
        assert!(err.is_transient());

        store.set_unavailable(false);
        assert!(store.events("c1").await.unwrap().is_empty());
    }

    struct Hanging;

    #[async_trait]
    impl CaseStore for Hanging {
        async fn get_case(&self, _case_id: &str) -> Result<CaseRecord, StoreError> {
            std::future::pending().await
        }

        async fn commit_transition(
            &self,
            _transition: &StatusTransition,
        ) -> Result<TransitionOutcome, StoreError> {
            std::future::pending().await
        }

        async fn open_cases(&self) -> Result<Vec<CaseRecord>, StoreError> {
            std::future::pending().await
        }

        async fn events(&self, _case_id: &str) -> Result<Vec<plazo_core::CaseEvent>, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_store_times_out() {
        let controller = controller_with(Arc::new(Hanging), Duration::from_millis(250));

        let err = controller
            .on_warning("c1", ts(2026, 3, 18, 0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Timeout {
                operation: "get_case",
                ..
            }
        ));
        assert!(err.is_transient());
        assert!(controller.sweep(ts(2026, 3, 25, 0)).await.is_err());
    }

    #[tokio::test]
    async fn busy_duckdb_connection_times_out() {
        let store = Arc::new(plazo_store::DuckCaseStore::open().unwrap());
        store
            .insert_case(&CaseRecord::submitted("c1", ts(2026, 3, 2, 15), None))
            .await
            .unwrap();
        let controller = controller_with(store.clone(), Duration::from_millis(50));

        let conn = store.connection();
        let guard = conn.lock().unwrap();
        let err = controller
            .on_warning("c1", ts(2026, 3, 18, 0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Timeout {
                operation: "get_case",
                ..
            }
        ));
        drop(guard);

        assert!(
            controller
                .on_warning("c1", ts(2026, 3, 18, 0))
                .await
                .unwrap()
                .is_applied()
        );
    }

    #[tokio::test]
    async fn sweep_escalates_overdue_cases_once() {
        let (store, controller) = setup();
        file_case(&store, "overdue");
        store
            .insert(CaseRecord::submitted(
                "recent",
                ts(2026, 3, 20, 9),
                None,
            ))
            .unwrap();
        store
            .insert(CaseRecord::submitted(
                "stored-deadline",
                ts(2026, 3, 20, 9),
                Some(NaiveDate::from_ymd_opt(2026, 3, 25).unwrap()),
            ))
            .unwrap();

        let now = ts(2026, 3, 26, 8);
        let first = controller.sweep(now).await.unwrap();
        assert_eq!(
            first,
            SweepReport {
                scanned: 3,
                escalated: 2,
                skipped: 0,
                failed: 0,
            }
        );

        let second = controller.sweep(now).await.unwrap();
        assert_eq!(second.scanned, 1);
        assert_eq!(second.escalated, 0);

        assert_eq!(
            event_types(&store, "overdue").await,
            vec![CaseEventType::DeadlineExpired]
        );
        assert_eq!(
            store.get_case("recent").await.unwrap().status,
            CaseStatus::Submitted
        );
    }

    #[tokio::test]
    async fn sweep_leaves_deadline_day_alone() {
        let (store, controller) = setup();
        file_case(&store, "c1");

        // The deadline instant is the start of 2026-03-24; it has not passed yet.
        let report = controller.sweep(ts(2026, 3, 24, 0)).await.unwrap();
        assert_eq!(report.escalated, 0);
        let report = controller.sweep(ts(2026, 3, 24, 1)).await.unwrap();
        assert_eq!(report.escalated, 1);
    }

    #[tokio::test]
    async fn sweep_counts_undatable_cases() {
        let (store, controller) = setup();
        store
            .insert(CaseRecord {
                id: "undated".into(),
                status: CaseStatus::Submitted,
                submission_date: None,
                deadline_date: None,
            })
            .unwrap();

        let report = controller.sweep(ts(2026, 3, 24, 1)).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(
            store.get_case("undated").await.unwrap().status,
            CaseStatus::Submitted
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_expiration_and_sweep_write_one_event() {
        let (store, controller) = setup();
        file_case(&store, "c1");
        let controller = Arc::new(controller);
        let now = ts(2026, 3, 24, 6);

        let mut tasks = Vec::new();
        for i in 0..16 {
            let controller = controller.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    controller.on_expiration("c1", now).await.map(|o| o.is_applied())
                } else {
                    controller.sweep(now).await.map(|r| r.escalated == 1)
                }
            }));
        }
        let mut applied = 0;
        for task in tasks {
            if task.await.unwrap().unwrap() {
                applied += 1;
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(
            event_types(&store, "c1").await,
            vec![CaseEventType::DeadlineExpired]
        );
    }
}
