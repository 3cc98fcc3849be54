//! Statutory response deadlines for filed petitions.
//!
//! A filed case gets two delayed triggers: a warning a few business days
//! before the deadline and an expiration on the deadline itself. Triggers
//! drive guarded status transitions; a periodic sweep escalates anything a
//! lost trigger left behind.

mod error;
pub mod lifecycle;
pub mod queue;
pub mod runner;
pub mod scheduler;

pub use error::{LifecycleError, ScheduleError};
pub use lifecycle::{CaseLifecycleController, SweepReport, TriggerHandler};
pub use queue::TokioDelayQueue;
pub use runner::SweepRunner;
pub use scheduler::{
    DeadlineCalculator, DeadlineDates, DeadlineScheduler, DelayedExecutor, ScheduledDeadlines,
    ScheduledTrigger,
};
