//! Deadline policy and runtime configuration.
//!
//! Every statutory constant lives here so that changing the response window
//! or the holiday list never touches calendar arithmetic. Configuration is
//! read from JSON, filled in with defaults, and validated once at start-up;
//! any validation failure is fatal.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::CalendarError;
use crate::clock::BusinessDayClock;
use crate::holidays::{
    DEFAULT_CACHE_YEARS, DEFAULT_MAX_YEAR, DEFAULT_MIN_YEAR, HolidayCalendar, HolidayRules,
};

/// Business days the authority has to answer a petition.
pub const RESPONSE_DEADLINE_DAYS: u32 = 15;

/// Business days before the deadline at which the warning fires.
pub const WARNING_LEAD_DAYS: u32 = 3;

/// Business days after an event within which a notification must be delivered.
pub const NOTIFICATION_WINDOW_DAYS: u32 = 13;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response_deadline_days must be positive")]
    ZeroDeadline,

    #[error(
        "warning_lead_days ({lead}) must be positive and smaller than response_deadline_days ({deadline})"
    )]
    InvalidWarningLead { lead: u32, deadline: u32 },

    #[error("holiday list has {found} rules but {expected} are expected")]
    HolidayCount { expected: usize, found: usize },

    #[error("invalid supported year range {min}..={max}")]
    InvalidYearRange { min: i32, max: i32 },

    #[error("{0} must be positive")]
    ZeroRuntimeValue(&'static str),

    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

/// Statutory policy: response window, warning lead, holiday list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub response_deadline_days: u32,
    pub warning_lead_days: u32,
    pub notification_window_days: u32,
    pub holidays: HolidayRules,
    pub min_year: i32,
    pub max_year: i32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            response_deadline_days: RESPONSE_DEADLINE_DAYS,
            warning_lead_days: WARNING_LEAD_DAYS,
            notification_window_days: NOTIFICATION_WINDOW_DAYS,
            holidays: HolidayRules::colombia(),
            min_year: DEFAULT_MIN_YEAR,
            max_year: DEFAULT_MAX_YEAR,
        }
    }
}

impl PolicyConfig {
    /// Business-day offset of the warning trigger from submission.
    pub fn warning_offset_days(&self) -> u32 {
        self.response_deadline_days - self.warning_lead_days
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.response_deadline_days == 0 {
            return Err(ConfigError::ZeroDeadline);
        }
        if self.warning_lead_days == 0 || self.warning_lead_days >= self.response_deadline_days {
            return Err(ConfigError::InvalidWarningLead {
                lead: self.warning_lead_days,
                deadline: self.response_deadline_days,
            });
        }
        if self.holidays.rules.len() != self.holidays.expected_count {
            return Err(ConfigError::HolidayCount {
                expected: self.holidays.expected_count,
                found: self.holidays.rules.len(),
            });
        }
        if self.min_year > self.max_year {
            return Err(ConfigError::InvalidYearRange {
                min: self.min_year,
                max: self.max_year,
            });
        }
        self.holidays.validate()?;
        Ok(())
    }
}

/// Operational knobs for the scheduler, store calls and sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub store_timeout_ms: u64,
    pub sweep_interval_secs: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub holiday_cache_years: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: 5_000,
            sweep_interval_secs: 24 * 60 * 60,
            max_attempts: 5,
            retry_backoff_ms: 1_000,
            holiday_cache_years: DEFAULT_CACHE_YEARS,
        }
    }
}

impl RuntimeConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::ZeroRuntimeValue("store_timeout_ms"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::ZeroRuntimeValue("sweep_interval_secs"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroRuntimeValue("max_attempts"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub policy: PolicyConfig,
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&json)?;
        info!(
            path = %path.display(),
            response_deadline_days = config.policy.response_deadline_days,
            warning_lead_days = config.policy.warning_lead_days,
            holidays = config.policy.holidays.rules.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy.validate()?;
        self.runtime.validate()
    }

    /// Build the holiday calendar described by this configuration.
    pub fn calendar(&self) -> Result<HolidayCalendar, ConfigError> {
        let calendar = HolidayCalendar::new(self.policy.holidays.clone())?
            .with_year_range(self.policy.min_year..=self.policy.max_year)
            .with_cache_capacity(self.runtime.holiday_cache_years);
        Ok(calendar)
    }

    pub fn clock(&self) -> Result<BusinessDayClock, ConfigError> {
        Ok(BusinessDayClock::new(Arc::new(self.calendar()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holidays::HolidayRule;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.policy.response_deadline_days, 15);
        assert_eq!(config.policy.warning_lead_days, 3);
        assert_eq!(config.policy.warning_offset_days(), 12);
        assert_eq!(config.policy.holidays.expected_count, 18);
    }

    #[test]
    fn empty_json_takes_defaults() {
        let config = Config::from_json_str("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_json_overrides_only_given_fields() {
        let config = Config::from_json_str(
            r#"{ "policy": { "response_deadline_days": 10 }, "runtime": { "max_attempts": 2 } }"#,
        )
        .unwrap();
        assert_eq!(config.policy.response_deadline_days, 10);
        assert_eq!(config.policy.warning_lead_days, 3);
        assert_eq!(config.runtime.max_attempts, 2);
        assert_eq!(config.runtime.store_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn warning_lead_must_fit_inside_deadline() {
        let err = Config::from_json_str(
            r#"{ "policy": { "response_deadline_days": 3, "warning_lead_days": 3 } }"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidWarningLead {
                lead: 3,
                deadline: 3
            }
        ));

        let err = Config::from_json_str(r#"{ "policy": { "warning_lead_days": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWarningLead { .. }));

        let err =
            Config::from_json_str(r#"{ "policy": { "response_deadline_days": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroDeadline));
    }

    #[test]
    fn holiday_count_mismatch_is_fatal() {
        let mut config = Config::default();
        config.policy.holidays.rules.pop();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::HolidayCount {
                expected: 18,
                found: 17
            })
        ));
    }

    #[test]
    fn changed_statutory_list_is_accepted_with_matching_count() {
        let mut config = Config::default();
        config
            .policy
            .holidays
            .rules
            .push(HolidayRule::fixed_movable("Nuevo festivo", 9, 9));
        config.policy.holidays.expected_count = 19;
        config.validate().unwrap();
        let calendar = config.calendar().unwrap();
        assert_eq!(calendar.holidays_for_year(2026).unwrap().len(), 19);
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            Config::from_json_str("{ not json"),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            Config::from_json_str(r#"{ "policy": { "response_deadline_days": "quince" } }"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn runtime_zero_values_rejected() {
        let err = Config::from_json_str(r#"{ "runtime": { "store_timeout_ms": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroRuntimeValue("store_timeout_ms")));
    }

    #[test]
    fn invalid_year_range_rejected() {
        let err = Config::from_json_str(r#"{ "policy": { "min_year": 2030, "max_year": 2020 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidYearRange { .. }));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "policy": {{ "warning_lead_days": 5 }} }}"#).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.policy.warning_lead_days, 5);
        assert_eq!(config.policy.warning_offset_days(), 10);
    }

    #[test]
    fn load_missing_file_errors() {
        let err = Config::load(Path::new("/nonexistent/plazo.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn clock_honours_year_range() {
        let mut config = Config::default();
        config.policy.min_year = 2020;
        config.policy.max_year = 2030;
        let clock = config.clock().unwrap();
        assert!(clock.is_business_day("2026-02-24".parse().unwrap()).unwrap());
        assert!(clock.is_business_day("2031-02-24".parse().unwrap()).is_err());
    }
}
