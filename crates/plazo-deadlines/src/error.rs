use std::time::Duration;

use plazo_core::CalendarError;
use plazo_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error("delayed-execution facility unavailable: {0}")]
    Unavailable(String),
}

impl ScheduleError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error("case store call `{operation}` timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("case {0} has neither a deadline nor a submission date")]
    MissingDates(String),
}

impl LifecycleError {
    /// Whether the delayed-execution facility should retry the handler.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::Timeout { .. } => true,
            Self::Calendar(_) | Self::MissingDates(_) => false,
        }
    }
}
