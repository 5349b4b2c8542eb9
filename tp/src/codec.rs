//! Status codec
//!
//! The three-state mark cycle and the composite `"<memberId>_<YYYY-MM-DD>"`
//! keys used by the status grid.

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Date format used in grid keys
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Separator between member id and date in a grid key
pub const KEY_SEPARATOR: char = '_';

/// A dinner mark for one member on one day
///
/// Absence of a grid entry is the fourth, implicit "unset" state. Wire names
/// are the ones the shared backend already stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Eating at home
    #[serde(rename = "maru")]
    Eating,
    /// Not eating at home
    #[serde(rename = "batsu")]
    NotEating,
    /// Not decided yet
    #[serde(rename = "hatena")]
    Undecided,
}

impl Status {
    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eating => "maru",
            Self::NotEating => "batsu",
            Self::Undecided => "hatena",
        }
    }

    /// Single-character mark for grid rendering
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eating => "○",
            Self::NotEating => "×",
            Self::Undecided => "?",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Advance one step through the cycle: Eating → NotEating → Undecided → unset → Eating
pub fn next_status(current: Option<Status>) -> Option<Status> {
    match current {
        None => Some(Status::Eating),
        Some(Status::Eating) => Some(Status::NotEating),
        Some(Status::NotEating) => Some(Status::Undecided),
        Some(Status::Undecided) => None,
    }
}

/// Format a calendar date as `YYYY-MM-DD`
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Format an instant as `YYYY-MM-DD` using local calendar fields
///
/// Two devices in different time zones can disagree about which day an
/// instant belongs to; that ambiguity is accepted.
pub fn format_local(instant: &DateTime<Local>) -> String {
    format_date(instant.date_naive())
}

/// Parse a `YYYY-MM-DD` string
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

/// Build the grid key for a member and day
pub fn make_key(member_id: &str, date: NaiveDate) -> String {
    format!("{}{}{}", member_id, KEY_SEPARATOR, format_date(date))
}

/// Key prefix shared by every grid entry of a member
pub fn member_prefix(member_id: &str) -> String {
    format!("{}{}", member_id, KEY_SEPARATOR)
}

/// Split a grid key back into member id and date
///
/// Splits on the last separator, so member ids may themselves contain `_`.
pub fn split_key(key: &str) -> Option<(&str, NaiveDate)> {
    let (member_id, date) = key.rsplit_once(KEY_SEPARATOR)?;
    let parsed = parse_iso_date(date);
    if parsed.is_none() {
        debug!(%key, "split_key: date part is not an ISO date");
    }
    Some((member_id, parsed?))
}
