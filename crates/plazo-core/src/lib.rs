//! Core types for petition deadline tracking under the Colombian statutory calendar.

pub mod case;
pub mod clock;
pub mod config;
mod error;
pub mod holidays;

pub use case::{CaseEvent, CaseEventType, CaseRecord, CaseStatus, ParseCaseError, TriggerKind};
pub use clock::{BusinessDayClock, NotificationCheck};
pub use config::{Config, ConfigError, PolicyConfig, RuntimeConfig};
pub use error::CalendarError;
pub use holidays::{HolidayCalendar, HolidayDate, HolidayEntry, HolidayRule, HolidayRules};
