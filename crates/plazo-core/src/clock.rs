//! Business-day arithmetic over the observed holiday calendar.
//!
//! All operations are date-only. A business day is any Monday–Friday that is
//! not an observed holiday. Counting walks one calendar day at a time:
//! the starting date is never counted, the target date is counted when it is
//! stepped onto, and the sign follows the direction of the walk.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::CalendarError;
use crate::holidays::{HolidayCalendar, YearHolidays};

/// Outcome of checking a notification against its business-day window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationCheck {
    pub business_days: i32,
    pub window_days: u32,
    pub exceeds_window: bool,
}

/// Stateless business-day predicates and arithmetic.
#[derive(Clone, Default)]
pub struct BusinessDayClock {
    calendar: Arc<HolidayCalendar>,
}

impl BusinessDayClock {
    pub fn new(calendar: Arc<HolidayCalendar>) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> &HolidayCalendar {
        &self.calendar
    }

    /// `false` on weekends and observed holidays.
    pub fn is_business_day(&self, date: NaiveDate) -> Result<bool, CalendarError> {
        YearCursor::new(&self.calendar).is_business_day(date)
    }

    /// Signed count of business days walking from `from` to `to`.
    ///
    /// `from` is never counted and `to` is. Because the walk is half-open,
    /// `between(a, b) + between(b, a)` equals `is_business_day(later) -
    /// is_business_day(earlier)`, so the two directions only mirror exactly
    /// when both endpoints have the same business-day status.
    pub fn business_days_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<i32, CalendarError> {
        if from == to {
            return Ok(0);
        }
        let forward = to > from;
        let step = if forward { 1 } else { -1 };
        let mut cursor = YearCursor::new(&self.calendar);
        let mut count = 0;
        let mut current = from;
        while current != to {
            current = step_day(current, forward)?;
            if cursor.is_business_day(current)? {
                count += step;
            }
        }
        Ok(count)
    }

    /// Move `days` business days away from `from` (backwards when negative).
    ///
    /// `from` is returned unchanged for zero, even when it is not itself a
    /// business day.
    pub fn add_business_days(&self, from: NaiveDate, days: i32) -> Result<NaiveDate, CalendarError> {
        if days == 0 {
            return Ok(from);
        }
        let forward = days > 0;
        let mut remaining = days.unsigned_abs();
        let mut cursor = YearCursor::new(&self.calendar);
        let mut current = from;
        while remaining > 0 {
            current = step_day(current, forward)?;
            if cursor.is_business_day(current)? {
                remaining -= 1;
            }
        }
        Ok(current)
    }

    /// Business days from `event` to `notified`, flagged when over `window_days`.
    ///
    /// A notification delivered more than the window after the event is
    /// invalid grounds for the fine.
    pub fn notification_check(
        &self,
        event: NaiveDate,
        notified: NaiveDate,
        window_days: u32,
    ) -> Result<NotificationCheck, CalendarError> {
        let business_days = self.business_days_between(event, notified)?;
        let exceeds_window = i64::from(business_days) > i64::from(window_days);
        Ok(NotificationCheck {
            business_days,
            window_days,
            exceeds_window,
        })
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn step_day(date: NaiveDate, forward: bool) -> Result<NaiveDate, CalendarError> {
    let next = if forward { date.succ_opt() } else { date.pred_opt() };
    next.ok_or(CalendarError::DateOverflow(date))
}

/// Keeps the current year's holiday set while walking day by day.
struct YearCursor<'a> {
    calendar: &'a HolidayCalendar,
    current: Option<Arc<YearHolidays>>,
}

impl<'a> YearCursor<'a> {
    fn new(calendar: &'a HolidayCalendar) -> Self {
        Self {
            calendar,
            current: None,
        }
    }

    fn is_business_day(&mut self, date: NaiveDate) -> Result<bool, CalendarError> {
        let holidays = match &self.current {
            Some(year) if year.year() == date.year() => Arc::clone(year),
            _ => {
                let year = self.calendar.year(date.year())?;
                self.current = Some(Arc::clone(&year));
                year
            }
        };
        Ok(!is_weekend(date) && !holidays.is_observed(date))
    }
}
