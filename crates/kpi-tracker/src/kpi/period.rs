use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Last year a period may name.
pub const MAX_YEAR: i32 = 9999;

/// Monthly reporting period. Ordering follows the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub const fn new(month: u32, year: i32) -> Self {
        Self { year, month }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Moves `delta` months forward (negative moves back), rolling across years.
    /// `None` when the resulting year does not fit.
    pub fn checked_shift_months(self, delta: i32) -> Option<Self> {
        let index =
            i64::from(self.year) * 12 + i64::from(self.month) - 1 + i64::from(delta);
        Some(Self {
            year: i32::try_from(index.div_euclid(12)).ok()?,
            month: index.rem_euclid(12) as u32 + 1,
        })
    }

    /// Saturating form of [`Period::checked_shift_months`]: stays put at the
    /// edge of the representable range.
    pub fn shift_months(self, delta: i32) -> Self {
        self.checked_shift_months(delta).unwrap_or(self)
    }

    pub fn previous(self) -> Self {
        self.shift_months(-1)
    }

    pub fn next(self) -> Self {
        self.shift_months(1)
    }

    pub fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn days(self) -> u32 {
        match (self.first_day(), self.next().first_day()) {
            (Some(start), Some(end)) => (end - start).num_days() as u32,
            _ => 0,
        }
    }

    /// Resolves a requested month/year against the current period.
    ///
    /// Positive values are literal. A non-positive year is an offset from the
    /// current year; month `0` keeps the current month and a negative month
    /// steps back that many months from the resolved year.
    pub fn resolve(month: i32, year: i32, current: Period) -> Result<Self, PeriodError> {
        let out_of_range = || PeriodError::OutOfRange { month, year };
        let year = if year > 0 {
            year
        } else {
            current.year.checked_add(year).ok_or_else(out_of_range)?
        };

        match month {
            m if m > 0 => Ok(Self {
                year,
                month: m.unsigned_abs(),
            }),
            0 => Ok(Self {
                year,
                month: current.month,
            }),
            m => Self {
                year,
                month: current.month,
            }
            .checked_shift_months(m)
            .ok_or_else(out_of_range),
        }
    }

    pub fn validate(self, min_year: i32) -> Result<Self, PeriodError> {
        if !(1..=12).contains(&self.month) {
            return Err(PeriodError::InvalidMonth(self.month));
        }
        if self.year < min_year {
            return Err(PeriodError::YearBelowFloor {
                year: self.year,
                floor: min_year,
            });
        }
        if self.year > MAX_YEAR {
            return Err(PeriodError::YearAboveCeiling {
                year: self.year,
                ceiling: MAX_YEAR,
            });
        }
        Ok(self)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeriodError {
    #[error("month {0} is outside 1-12")]
    InvalidMonth(u32),
    #[error("year {year} is before the reporting floor {floor}")]
    YearBelowFloor { year: i32, floor: i32 },
    #[error("year {year} is past the last supported year {ceiling}")]
    YearAboveCeiling { year: i32, ceiling: i32 },
    #[error("month {month} / year {year} does not resolve to a calendar period")]
    OutOfRange { month: i32, year: i32 },
}

/// Wall-clock source in the service's fixed time zone.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    fn current_period(&self) -> Period {
        Period::from_date(self.now().date_naive())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Settable clock for demos and tests.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<FixedOffset>>,
}

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Midnight UTC on the given date.
    pub fn on(year: i32, month: u32, day: u32) -> Option<Self> {
        let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
        Some(Self::new(Utc.fix().from_utc_datetime(&naive)))
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        let mut guard = self.now.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
