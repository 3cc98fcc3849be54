//! Deadline computation and registration of the two delayed triggers per case.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use plazo_core::{BusinessDayClock, CalendarError, PolicyConfig, TriggerKind};
use tracing::info;

use crate::ScheduleError;

/// Work handed to the delayed-execution facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTrigger {
    pub case_id: String,
    pub kind: TriggerKind,
    pub fire_at: DateTime<Utc>,
}

impl ScheduledTrigger {
    pub fn key(&self) -> String {
        self.kind.key_for(&self.case_id)
    }
}

/// Something that runs a trigger once its delay has elapsed.
///
/// Scheduling under a key that already has a pending trigger replaces it.
/// Delivery is at-least-once, so handlers must be idempotent.
#[async_trait]
pub trait DelayedExecutor: Send + Sync {
    async fn schedule_delayed(
        &self,
        key: &str,
        delay: Duration,
        trigger: ScheduledTrigger,
    ) -> Result<(), ScheduleError>;
}

/// The two dates derived from a submission date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineDates {
    pub warning_date: NaiveDate,
    pub deadline_date: NaiveDate,
}

impl DeadlineDates {
    pub fn warning_at(&self) -> DateTime<Utc> {
        start_of_day(self.warning_date)
    }

    pub fn deadline_at(&self) -> DateTime<Utc> {
        start_of_day(self.deadline_date)
    }
}

/// Triggers fire at the start of their day, UTC.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Delay from `now` until `fire_at`, clamped at zero.
pub fn delay_until(fire_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (fire_at - now).to_std().unwrap_or(Duration::ZERO)
}

/// Business-day arithmetic for the response deadline and its warning.
#[derive(Clone)]
pub struct DeadlineCalculator {
    clock: BusinessDayClock,
    response_days: u32,
    warning_offset: u32,
}

impl DeadlineCalculator {
    pub fn new(clock: BusinessDayClock, policy: &PolicyConfig) -> Self {
        Self {
            clock,
            response_days: policy.response_deadline_days,
            warning_offset: policy.warning_offset_days(),
        }
    }

    pub fn clock(&self) -> &BusinessDayClock {
        &self.clock
    }

    pub fn response_days(&self) -> u32 {
        self.response_days
    }

    /// Warning and deadline dates for a case filed on `submission`.
    pub fn compute(&self, submission: NaiveDate) -> Result<DeadlineDates, CalendarError> {
        Ok(DeadlineDates {
            warning_date: self.clock.add_business_days(submission, to_days(self.warning_offset))?,
            deadline_date: self.clock.add_business_days(submission, to_days(self.response_days))?,
        })
    }
}

fn to_days(days: u32) -> i32 {
    i32::try_from(days).unwrap_or(i32::MAX)
}

/// Keys and dates registered by [`DeadlineScheduler::schedule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledDeadlines {
    pub warning_key: String,
    pub expiration_key: String,
    pub dates: DeadlineDates,
}

/// Registers the warning and expiration triggers of a newly filed case.
#[derive(Clone)]
pub struct DeadlineScheduler {
    calculator: DeadlineCalculator,
    executor: Arc<dyn DelayedExecutor>,
}

impl DeadlineScheduler {
    pub fn new(calculator: DeadlineCalculator, executor: Arc<dyn DelayedExecutor>) -> Self {
        Self {
            calculator,
            executor,
        }
    }

    pub fn calculator(&self) -> &DeadlineCalculator {
        &self.calculator
    }

    /// Dates for a submission, without registering anything.
    pub fn compute(&self, submission: NaiveDate) -> Result<DeadlineDates, CalendarError> {
        self.calculator.compute(submission)
    }

    /// Compute the case's dates and register both triggers.
    ///
    /// The submission date is taken in UTC. Re-scheduling the same case
    /// replaces the pending triggers, since the keys depend only on the case id.
    pub async fn schedule(
        &self,
        case_id: &str,
        submission: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<ScheduledDeadlines, ScheduleError> {
        let dates = self.compute(submission.date_naive())?;

        let warning = ScheduledTrigger {
            case_id: case_id.to_string(),
            kind: TriggerKind::Warning,
            fire_at: dates.warning_at(),
        };
        let expiration = ScheduledTrigger {
            case_id: case_id.to_string(),
            kind: TriggerKind::Expiration,
            fire_at: dates.deadline_at(),
        };
        let warning_key = warning.key();
        let expiration_key = expiration.key();

        self.executor
            .schedule_delayed(&warning_key, delay_until(warning.fire_at, now), warning)
            .await?;
        self.executor
            .schedule_delayed(
                &expiration_key,
                delay_until(expiration.fire_at, now),
                expiration,
            )
            .await?;

        info!(
            case_id,
            warning = %dates.warning_date,
            deadline = %dates.deadline_date,
            "scheduled deadline triggers"
        );
        Ok(ScheduledDeadlines {
            warning_key,
            expiration_key,
            dates,
        })
    }
}
