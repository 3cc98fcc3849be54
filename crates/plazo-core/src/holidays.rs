//! Colombian statutory holiday calendar.
//!
//! Holidays come in three flavours:
//!
//! - fixed dates always observed on the day (Año Nuevo, Navidad, ...)
//! - fixed dates moved to the following Monday by Ley 51 de 1983 (Ley Emiliani)
//! - dates relative to Easter Sunday, some of which are also moved to Monday
//!
//! [`HolidayCalendar`] turns a [`HolidayRules`] list into per-year
//! [`HolidayEntry`] sets and memoizes them in a bounded, resettable cache.
//! Business-day counting only ever looks at the *observed* date of a holiday.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::CalendarError;

/// Number of holidays in the current Colombian statutory list.
pub const STATUTORY_HOLIDAY_COUNT: usize = 18;

/// First year the Monday-shift rule applies to.
pub const DEFAULT_MIN_YEAR: i32 = 1984;

/// Last year the calendar accepts by default.
pub const DEFAULT_MAX_YEAR: i32 = 4099;

/// Default number of calendar years kept in the cache.
pub const DEFAULT_CACHE_YEARS: usize = 64;

/// How a holiday's canonical date is derived for a given year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HolidayDate {
    /// Same month/day every year.
    Fixed { month: u32, day: u32 },
    /// Signed offset in calendar days from Easter Sunday.
    EasterOffset { days: i64 },
}

/// One entry of the statutory holiday list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayRule {
    pub name: String,
    pub date: HolidayDate,
    /// Whether the Monday-shift rule applies.
    #[serde(default)]
    pub moves_to_monday: bool,
}

impl HolidayRule {
    pub fn fixed(name: &str, month: u32, day: u32) -> Self {
        Self {
            name: name.to_string(),
            date: HolidayDate::Fixed { month, day },
            moves_to_monday: false,
        }
    }

    pub fn fixed_movable(name: &str, month: u32, day: u32) -> Self {
        Self {
            moves_to_monday: true,
            ..Self::fixed(name, month, day)
        }
    }

    pub fn easter(name: &str, days: i64) -> Self {
        Self {
            name: name.to_string(),
            date: HolidayDate::EasterOffset { days },
            moves_to_monday: false,
        }
    }

    pub fn easter_movable(name: &str, days: i64) -> Self {
        Self {
            moves_to_monday: true,
            ..Self::easter(name, days)
        }
    }

    /// Reject rules that cannot produce a date in every year.
    pub fn validate(&self) -> Result<(), CalendarError> {
        let invalid = |reason: &str| CalendarError::InvalidRule {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        match self.date {
            // 2023 is not a leap year, so Feb 29 is rejected here.
            HolidayDate::Fixed { month, day } => {
                if NaiveDate::from_ymd_opt(2023, month, day).is_none() {
                    return Err(invalid("month/day does not exist in every year"));
                }
            }
            HolidayDate::EasterOffset { days } => {
                if days.abs() > 180 {
                    return Err(invalid("Easter offset must stay within 180 days"));
                }
            }
        }
        Ok(())
    }

    fn canonical_date(&self, year: i32, easter: NaiveDate) -> Option<NaiveDate> {
        match self.date {
            HolidayDate::Fixed { month, day } => NaiveDate::from_ymd_opt(year, month, day),
            HolidayDate::EasterOffset { days } if days >= 0 => {
                easter.checked_add_days(Days::new(days.unsigned_abs()))
            }
            HolidayDate::EasterOffset { days } => {
                easter.checked_sub_days(Days::new(days.unsigned_abs()))
            }
        }
    }
}

/// The configured holiday list plus the count it is expected to have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HolidayRules {
    pub expected_count: usize,
    pub rules: Vec<HolidayRule>,
}

impl Default for HolidayRules {
    fn default() -> Self {
        Self::colombia()
    }
}

impl HolidayRules {
    /// The current Colombian statutory list (Ley 51 de 1983).
    pub fn colombia() -> Self {
        let rules = vec![
            HolidayRule::fixed("Año Nuevo", 1, 1),
            HolidayRule::fixed_movable("Reyes Magos", 1, 6),
            HolidayRule::fixed_movable("San José", 3, 19),
            HolidayRule::easter("Jueves Santo", -3),
            HolidayRule::easter("Viernes Santo", -2),
            HolidayRule::fixed("Día del Trabajo", 5, 1),
            HolidayRule::easter_movable("Ascensión del Señor", 39),
            HolidayRule::easter_movable("Corpus Christi", 60),
            HolidayRule::easter_movable("Sagrado Corazón", 68),
            HolidayRule::fixed_movable("San Pedro y San Pablo", 6, 29),
            HolidayRule::fixed("Día de la Independencia", 7, 20),
            HolidayRule::fixed("Batalla de Boyacá", 8, 7),
            HolidayRule::fixed_movable("Asunción de la Virgen", 8, 15),
            HolidayRule::fixed_movable("Día de la Raza", 10, 12),
            HolidayRule::fixed_movable("Todos los Santos", 11, 1),
            HolidayRule::fixed_movable("Independencia de Cartagena", 11, 11),
            HolidayRule::fixed("Inmaculada Concepción", 12, 8),
            HolidayRule::fixed("Navidad", 12, 25),
        ];
        Self {
            expected_count: STATUTORY_HOLIDAY_COUNT,
            rules,
        }
    }

    pub fn validate(&self) -> Result<(), CalendarError> {
        self.rules.iter().try_for_each(HolidayRule::validate)
    }
}

/// A holiday as it occurs in one particular year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayEntry {
    /// Date of legal or religious occurrence.
    pub canonical_date: NaiveDate,
    /// Date excluded from business-day counting.
    pub observed_date: NaiveDate,
    pub name: String,
}

impl HolidayEntry {
    pub fn is_shifted(&self) -> bool {
        self.canonical_date != self.observed_date
    }
}

/// Easter Sunday for a Gregorian year (Meeus/Jones/Butcher computus).
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year.rem_euclid(19);
    let b = year.div_euclid(100);
    let c = year.rem_euclid(100);
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15).rem_euclid(30);
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k).rem_euclid(7);
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)
}

/// The Monday on or after `date`.
fn monday_on_or_after(date: NaiveDate) -> Option<NaiveDate> {
    let ahead = (7 - date.weekday().num_days_from_monday()) % 7;
    date.checked_add_days(Days::new(u64::from(ahead)))
}

/// Compute every entry whose canonical date falls in `year`, ordered by observed date.
fn compute_entries(rules: &[HolidayRule], year: i32) -> Option<Vec<HolidayEntry>> {
    let easter = easter_sunday(year)?;
    let mut entries = Vec::with_capacity(rules.len());
    for rule in rules {
        let canonical_date = rule.canonical_date(year, easter)?;
        let observed_date = if rule.moves_to_monday {
            monday_on_or_after(canonical_date)?
        } else {
            canonical_date
        };
        if observed_date.year() != year {
            debug!(
                holiday = %rule.name,
                %canonical_date,
                %observed_date,
                "observed date crosses the year boundary"
            );
        }
        entries.push(HolidayEntry {
            canonical_date,
            observed_date,
            name: rule.name.clone(),
        });
    }
    entries.sort_by_key(|e| (e.observed_date, e.canonical_date));
    Some(entries)
}

/// Holidays of one calendar year plus the observed-date lookup set.
///
/// `observed` holds every observed date that lands in the year, including
/// dates shifted forward from the previous year's late-December holidays.
#[derive(Debug)]
pub struct YearHolidays {
    year: i32,
    entries: Vec<HolidayEntry>,
    observed: HashSet<NaiveDate>,
}

impl YearHolidays {
    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn entries(&self) -> &[HolidayEntry] {
        &self.entries
    }

    pub fn is_observed(&self, date: NaiveDate) -> bool {
        self.observed.contains(&date)
    }

    pub fn observed_dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.observed.iter().copied().collect();
        dates.sort();
        dates
    }
}

/// Per-year holiday sets computed from a rule list.
///
/// Results are pure functions of the year, so they are cached indefinitely up
/// to `capacity` years. The cache is owned by the calendar and can be reset.
pub struct HolidayCalendar {
    rules: HolidayRules,
    min_year: i32,
    max_year: i32,
    capacity: usize,
    cache: RwLock<HashMap<i32, Arc<YearHolidays>>>,
}

impl Default for HolidayCalendar {
    fn default() -> Self {
        Self {
            rules: HolidayRules::colombia(),
            min_year: DEFAULT_MIN_YEAR,
            max_year: DEFAULT_MAX_YEAR,
            capacity: DEFAULT_CACHE_YEARS,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl HolidayCalendar {
    /// Build a calendar from a custom rule list.
    pub fn new(rules: HolidayRules) -> Result<Self, CalendarError> {
        rules.validate()?;
        Ok(Self {
            rules,
            ..Self::default()
        })
    }

    pub fn with_year_range(mut self, years: RangeInclusive<i32>) -> Self {
        self.min_year = *years.start();
        self.max_year = *years.end();
        self.clear_cache();
        self
    }

    pub fn with_cache_capacity(mut self, years: usize) -> Self {
        self.capacity = years;
        self.clear_cache();
        self
    }

    pub fn rules(&self) -> &HolidayRules {
        &self.rules
    }

    pub fn supported_years(&self) -> RangeInclusive<i32> {
        self.min_year..=self.max_year
    }

    /// Holidays whose canonical date falls in `year`, ordered by observed date.
    pub fn holidays_for_year(&self, year: i32) -> Result<Vec<HolidayEntry>, CalendarError> {
        Ok(self.year(year)?.entries().to_vec())
    }

    /// Sorted observed dates that land in `year`.
    pub fn observed_dates(&self, year: i32) -> Result<Vec<NaiveDate>, CalendarError> {
        Ok(self.year(year)?.observed_dates())
    }

    /// Whether `date` is an observed holiday.
    pub fn is_holiday(&self, date: NaiveDate) -> Result<bool, CalendarError> {
        Ok(self.year(date.year())?.is_observed(date))
    }

    /// Cached (or freshly computed) holiday set for `year`.
    pub fn year(&self, year: i32) -> Result<Arc<YearHolidays>, CalendarError> {
        self.check_year(year)?;
        if let Some(hit) = self.read_cache().get(&year) {
            return Ok(Arc::clone(hit));
        }

        let computed = Arc::new(self.compute_year(year)?);
        if self.capacity == 0 {
            return Ok(computed);
        }

        let mut cache = self.write_cache();
        if !cache.contains_key(&year) && cache.len() >= self.capacity {
            // Evict the year farthest from the one being inserted.
            let farthest = cache
                .keys()
                .copied()
                .max_by_key(|y| (y - year).unsigned_abs());
            if let Some(farthest) = farthest {
                cache.remove(&farthest);
            }
        }
        Ok(Arc::clone(cache.entry(year).or_insert(computed)))
    }

    /// Years currently held in the cache, ascending.
    pub fn cached_years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.read_cache().keys().copied().collect();
        years.sort_unstable();
        years
    }

    pub fn clear_cache(&self) {
        self.write_cache().clear();
    }

    fn check_year(&self, year: i32) -> Result<(), CalendarError> {
        if (self.min_year..=self.max_year).contains(&year) {
            Ok(())
        } else {
            Err(CalendarError::YearOutOfRange {
                year,
                min: self.min_year,
                max: self.max_year,
            })
        }
    }

    fn compute_year(&self, year: i32) -> Result<YearHolidays, CalendarError> {
        let out_of_range = || CalendarError::YearOutOfRange {
            year,
            min: self.min_year,
            max: self.max_year,
        };
        let entries = compute_entries(&self.rules.rules, year).ok_or_else(out_of_range)?;

        let mut observed: HashSet<NaiveDate> = entries
            .iter()
            .map(|e| e.observed_date)
            .filter(|d| d.year() == year)
            .collect();

        if year > self.min_year {
            let previous = compute_entries(&self.rules.rules, year - 1).ok_or_else(out_of_range)?;
            observed.extend(
                previous
                    .iter()
                    .map(|e| e.observed_date)
                    .filter(|d| d.year() == year),
            );
        }

        debug!(year, holidays = entries.len(), "computed holiday set");
        Ok(YearHolidays {
            year,
            entries,
            observed,
        })
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, HashMap<i32, Arc<YearHolidays>>> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, HashMap<i32, Arc<YearHolidays>>> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}
