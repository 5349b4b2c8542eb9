//! Week window
//!
//! The view cursor over the status grid: a Sunday-anchored 7-day span.

use chrono::{DateTime, Datelike, Days, Local, NaiveDate};
use tracing::{debug, warn};

/// Column labels in display order, starting on Sunday
pub const WEEKDAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Days in a window
pub const DAYS_PER_WEEK: u64 = 7;

/// Direction to move the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekDirection {
    Previous,
    Next,
}

/// Most recent Sunday on or before `date`
pub fn sunday_on_or_before(date: NaiveDate) -> NaiveDate {
    let back = u64::from(date.weekday().num_days_from_sunday());
    date.checked_sub_days(Days::new(back)).unwrap_or(date)
}

/// `date` moved by `offset` whole weeks; `None` past the calendar range
pub fn shift_weeks(date: NaiveDate, offset: i64) -> Option<NaiveDate> {
    let days = Days::new(offset.unsigned_abs().checked_mul(DAYS_PER_WEEK)?);
    if offset < 0 {
        date.checked_sub_days(days)
    } else {
        date.checked_add_days(days)
    }
}

/// One column of the rendered week
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayColumn {
    pub date: NaiveDate,
    pub label: &'static str,
    pub is_weekend: bool,
    pub is_today: bool,
}

/// Sunday-anchored 7-day view span
///
/// Holds a calendar date, so the start is always midnight local time of that
/// Sunday. Not persisted anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekWindow {
    start: NaiveDate,
}

impl WeekWindow {
    /// Window containing `date`
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            start: sunday_on_or_before(date),
        }
    }

    /// Window containing today (local calendar)
    pub fn current() -> Self {
        Self::containing(Local::now().date_naive())
    }

    /// The Sunday this window starts on
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Local midnight at the start of the window
    ///
    /// `None` only where local midnight does not exist on that day.
    pub fn start_local(&self) -> Option<DateTime<Local>> {
        self.start.and_hms_opt(0, 0, 0)?.and_local_timezone(Local).earliest()
    }

    /// Move by seven days and renormalize to the Sunday boundary
    pub fn shift(&mut self, direction: WeekDirection) {
        debug!(?direction, start = %self.start, "WeekWindow::shift: called");
        let week = Days::new(DAYS_PER_WEEK);
        let moved = match direction {
            WeekDirection::Previous => self.start.checked_sub_days(week),
            WeekDirection::Next => self.start.checked_add_days(week),
        };
        match moved {
            Some(date) => self.start = sunday_on_or_before(date),
            None => warn!(start = %self.start, "WeekWindow::shift: date out of range, window unchanged"),
        }
    }

    /// The seven dates of the window, Sunday first
    pub fn days(&self) -> Vec<NaiveDate> {
        self.start.iter_days().take(DAYS_PER_WEEK as usize).collect()
    }

    /// Whether `date` falls inside the window
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && self.days().last().is_some_and(|last| date <= *last)
    }

    /// Column descriptors relative to `today`
    pub fn columns(&self, today: NaiveDate) -> Vec<DayColumn> {
        self.days()
            .into_iter()
            .zip(WEEKDAY_LABELS)
            .enumerate()
            .map(|(i, (date, label))| DayColumn {
                date,
                label,
                is_weekend: i == 0 || i == 6,
                is_today: date == today,
            })
            .collect()
    }
}

impl Default for WeekWindow {
    fn default() -> Self {
        Self::current()
    }
}
