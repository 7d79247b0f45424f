// ABOUTME: Time windows for incremental replication of data extension rows
// ABOUTME: Window arithmetic, the clock used to bound syncs, and date parsing

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::remote::DateRangeFilter;

/// Widest window accepted from config (about ten years).
pub const MAX_WINDOW_DAYS: i64 = 3_660;

/// Width of one replication window, e.g. `{"days": 1}` or `{"hours": 6}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowUnit {
    #[serde(default)]
    pub weeks: i64,
    #[serde(default)]
    pub days: i64,
    #[serde(default)]
    pub hours: i64,
    #[serde(default)]
    pub minutes: i64,
    #[serde(default)]
    pub seconds: i64,
}

impl Default for WindowUnit {
    fn default() -> Self {
        Self::days(1)
    }
}

impl WindowUnit {
    pub fn days(days: i64) -> Self {
        Self {
            weeks: 0,
            days,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }

    /// Total width, or an error when the components overflow.
    pub fn duration(&self) -> Result<Duration> {
        let parts = [
            (self.weeks, 7 * 86_400),
            (self.days, 86_400),
            (self.hours, 3_600),
            (self.minutes, 60),
            (self.seconds, 1),
        ];
        let seconds = parts
            .iter()
            .try_fold(0i64, |total, &(value, scale)| {
                value
                    .checked_mul(scale)
                    .and_then(|part| total.checked_add(part))
            })
            .ok_or_else(|| anyhow!("Window size {:?} is too large", self))?;
        Duration::try_seconds(seconds)
            .ok_or_else(|| anyhow!("Window size {:?} is too large", self))
    }

    /// A window that does not move forward would loop forever.
    pub fn validate(&self) -> Result<()> {
        let duration = self.duration()?;
        if duration <= Duration::zero() {
            bail!(
                "Window size must be positive, got {:?}. Set pagination.data_extension to e.g. {{\"days\": 1}}",
                self
            );
        }
        if duration > Duration::days(MAX_WINDOW_DAYS) {
            bail!(
                "Window size {:?} exceeds the maximum of {} days",
                self,
                MAX_WINDOW_DAYS
            );
        }
        Ok(())
    }
}

/// Half-open interval `[start, end)` of replication-key values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn starting_at(start: DateTime<Utc>, unit: &WindowUnit) -> Result<Self> {
        let end = start
            .checked_add_signed(unit.duration()?)
            .ok_or_else(|| {
                anyhow!(
                    "Window starting at {} runs past the latest representable date",
                    format_datetime(&start)
                )
            })?;
        Ok(Self { start, end })
    }

    /// The window immediately after this one.
    pub fn next(&self, unit: &WindowUnit) -> Result<Self> {
        Self::starting_at(self.end, unit)
    }

    pub fn filter(&self, property: &str) -> DateRangeFilter {
        DateRangeFilter {
            property: property.to_string(),
            start: self.start,
            end: self.end,
        }
    }
}

/// Source of "today" for deciding when windowing stops.
pub trait Clock {
    /// Midnight (UTC) of the current day.
    fn today(&self) -> DateTime<Utc>;

    fn before_today(&self, instant: &DateTime<Utc>) -> bool {
        *instant < self.today()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> DateTime<Utc> {
        midnight(Utc::now().date_naive())
    }
}

/// Clock pinned to a given day.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn on(date: NaiveDate) -> Self {
        Self(midnight(date))
    }
}

impl Clock for FixedClock {
    fn today(&self) -> DateTime<Utc> {
        self.0
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
];

/// Parse a bookmark, config date or replication-key value into UTC.
///
/// Accepts RFC 3339, naive ISO date-times (taken as UTC), plain `YYYY-MM-DD`
/// dates and the remote's `M/D/YYYY h:mm:ss AM` row format.
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&parsed));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(midnight(date));
    }
    bail!("Unrecognized date/time value '{}'", value)
}

/// Canonical form used in bookmarks and filters.
pub fn format_datetime(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}
