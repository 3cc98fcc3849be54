//! The slice of a petition case that deadline tracking reads and writes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind}: `{value}`")]
pub struct ParseCaseError {
    kind: &'static str,
    value: String,
}

/// Lifecycle status of a filed petition.
///
/// `Responded` and `Escalated` are terminal for deadline tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    Submitted,
    AwaitingResponse,
    Responded,
    Escalated,
}

impl CaseStatus {
    /// Statuses in which the authority still owes an answer.
    pub const OPEN: [Self; 2] = [Self::Submitted, Self::AwaitingResponse];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::AwaitingResponse => "AWAITING_RESPONSE",
            Self::Responded => "RESPONDED",
            Self::Escalated => "ESCALATED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Responded | Self::Escalated)
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = ParseCaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUBMITTED" => Ok(Self::Submitted),
            "AWAITING_RESPONSE" => Ok(Self::AwaitingResponse),
            "RESPONDED" => Ok(Self::Responded),
            "ESCALATED" => Ok(Self::Escalated),
            other => Err(ParseCaseError {
                kind: "case status",
                value: other.to_string(),
            }),
        }
    }
}

/// Type of an audit event appended on a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseEventType {
    DeadlineWarning,
    DeadlineExpired,
    ResponseReceived,
}

impl CaseEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeadlineWarning => "DEADLINE_WARNING",
            Self::DeadlineExpired => "DEADLINE_EXPIRED",
            Self::ResponseReceived => "RESPONSE_RECEIVED",
        }
    }
}

impl fmt::Display for CaseEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for CaseEventType {
    type Err = ParseCaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEADLINE_WARNING" => Ok(Self::DeadlineWarning),
            "DEADLINE_EXPIRED" => Ok(Self::DeadlineExpired),
            "RESPONSE_RECEIVED" => Ok(Self::ResponseReceived),
            other => Err(ParseCaseError {
                kind: "case event type",
                value: other.to_string(),
            }),
        }
    }
}

/// What the deadline core reads from a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: String,
    pub status: CaseStatus,
    pub submission_date: Option<DateTime<Utc>>,
    pub deadline_date: Option<NaiveDate>,
}

impl CaseRecord {
    pub fn submitted(id: &str, at: DateTime<Utc>, deadline_date: Option<NaiveDate>) -> Self {
        Self {
            id: id.to_string(),
            status: CaseStatus::Submitted,
            submission_date: Some(at),
            deadline_date,
        }
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseEvent {
    pub case_id: String,
    pub event_type: CaseEventType,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The two delayed triggers registered for every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Warning,
    Expiration,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Expiration => "expiration",
        }
    }

    /// Deterministic key: at most one live trigger per (kind, case).
    pub fn key_for(&self, case_id: &str) -> String {
        format!("{}:{case_id}", self.as_str())
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_forms() {
        for status in [
            CaseStatus::Submitted,
            CaseStatus::AwaitingResponse,
            CaseStatus::Responded,
            CaseStatus::Escalated,
        ] {
            assert_eq!(status.as_str().parse::<CaseStatus>().unwrap(), status);
        }
        assert!("DEADLINE_EXPIRED".parse::<CaseStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&CaseStatus::AwaitingResponse).unwrap(),
            "\"AWAITING_RESPONSE\""
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(CaseStatus::Responded.is_terminal());
        assert!(CaseStatus::Escalated.is_terminal());
        assert!(!CaseStatus::Submitted.is_terminal());
        assert!(CaseStatus::OPEN.iter().all(|s| !s.is_terminal()));
    }

    #[test]
    fn event_type_string_forms() {
        assert_eq!(
            "DEADLINE_EXPIRED".parse::<CaseEventType>().unwrap(),
            CaseEventType::DeadlineExpired
        );
        let err = "CREATED".parse::<CaseEventType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown case event type: `CREATED`");
    }

    #[test]
    fn trigger_keys_are_deterministic() {
        assert_eq!(TriggerKind::Expiration.key_for("c-42"), "expiration:c-42");
        assert_eq!(TriggerKind::Warning.key_for("c-42"), "warning:c-42");
    }
}
