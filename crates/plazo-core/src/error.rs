use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("year {year} is outside the supported calendar range {min}..={max}")]
    YearOutOfRange { year: i32, min: i32, max: i32 },

    #[error("date arithmetic overflowed stepping from {0}")]
    DateOverflow(NaiveDate),

    #[error("holiday rule `{name}` is invalid: {reason}")]
    InvalidRule { name: String, reason: String },
}
