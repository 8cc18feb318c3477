//! Day and week bucketing.
//!
//! Every function takes the timezone explicitly; nothing here reads the
//! process-local zone. Weeks run Sunday through Saturday. Bounds are inclusive
//! on both ends and stop at 23:59:59.999 local time.

use chrono::{
    DateTime, Datelike, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta,
    TimeZone, Utc,
};
use chrono_tz::Tz;
use thiserror::Error;

/// Milliseconds from local midnight to the last instant of the day.
const END_OF_DAY_MS: i64 = 86_400_000 - 1;

/// Naive formats accepted for a local date-time, tried in order.
const LOCAL_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

// ── Errors ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("Invalid date format: {0}")]
    InvalidDate(String),
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
}

// ── Spans ──────────────────────────────────────────────────────

/// An inclusive instant range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Span {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// True if the inclusive interval `[from, to]` shares an instant with this span.
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        from <= self.end && to >= self.start
    }
}

/// Local 00:00:00.000 through 23:59:59.999 of `day`.
pub fn day_bounds(day: NaiveDate, tz: Tz) -> Span {
    let midnight = day.and_time(NaiveTime::MIN);
    let last_ms = midnight
        .checked_add_signed(TimeDelta::milliseconds(END_OF_DAY_MS))
        .unwrap_or(NaiveDateTime::MAX);

    Span {
        start: resolve_local(tz, midnight, Edge::Start),
        end: resolve_local(tz, last_ms, Edge::End),
    }
}

/// The Sunday and Saturday of the week containing `day`.
pub fn week_dates(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    // 0 = Sunday .. 6 = Saturday
    let day_index = u64::from(day.weekday().num_days_from_sunday());
    let sunday = day
        .checked_sub_days(Days::new(day_index))
        .unwrap_or(NaiveDate::MIN);
    let saturday = day
        .checked_add_days(Days::new(6 - day_index))
        .unwrap_or(NaiveDate::MAX);
    (sunday, saturday)
}

/// Sunday 00:00:00.000 through the following Saturday 23:59:59.999, local to `tz`.
pub fn week_bounds(day: NaiveDate, tz: Tz) -> Span {
    let (sunday, saturday) = week_dates(day);
    Span {
        start: day_bounds(sunday, tz).start,
        end: day_bounds(saturday, tz).end,
    }
}

/// The calendar day an instant falls on in `tz`. Distinct days are counted by this key.
pub fn day_key(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

pub fn parse_timezone(raw: &str) -> Result<Tz, CalendarError> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|_| CalendarError::UnknownTimezone(raw.to_string()))
}

enum Edge {
    Start,
    End,
}

/// Pin a local wall-clock time to an instant. Ambiguous times (DST fall-back)
/// take the earlier instant for a start and the later one for an end.
fn resolve_local(tz: Tz, local: NaiveDateTime, edge: Edge) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(t) => t.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, latest) => match edge {
            Edge::Start => earliest.with_timezone(&Utc),
            Edge::End => latest.with_timezone(&Utc),
        },
        LocalResult::None => {
            // Inside a DST gap: use the offset in effect before the jump,
            // which lands exactly on the transition instant.
            let before = local.checked_sub_signed(TimeDelta::days(1)).unwrap_or(local);
            let offset = tz.offset_from_utc_datetime(&before).fix();
            local
                .checked_sub_signed(TimeDelta::seconds(offset.local_minus_utc().into()))
                .unwrap_or(local)
                .and_utc()
        }
    }
}

// ── Date inputs ────────────────────────────────────────────────

/// A date supplied by a client: the calendar day it names and, when the input
/// carried a time of day, the exact instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateInput {
    pub day: NaiveDate,
    pub instant: Option<DateTime<Utc>>,
}

impl DateInput {
    /// Accepts RFC 3339 (`2024-01-10T15:30:00Z`), a naive local date-time
    /// interpreted in `tz` (`2024-01-10T15:30:00`), or a bare date (`2024-01-10`).
    pub fn parse(raw: &str, tz: Tz) -> Result<Self, CalendarError> {
        let raw = raw.trim();

        if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
            let instant = t.with_timezone(&Utc);
            return Ok(DateInput {
                day: day_key(instant, tz),
                instant: Some(instant),
            });
        }

        for format in LOCAL_FORMATS {
            if let Ok(local) = NaiveDateTime::parse_from_str(raw, format) {
                return Ok(DateInput {
                    day: local.date(),
                    instant: Some(resolve_local(tz, local, Edge::Start)),
                });
            }
        }

        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|day| DateInput { day, instant: None })
            .map_err(|_| CalendarError::InvalidDate(raw.to_string()))
    }

    /// The instant this input stands for. A bare date resolves to `now` when
    /// `now` falls on that day, otherwise to the day's first instant.
    pub fn instant_or(&self, now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        match self.instant {
            Some(instant) => instant,
            None => {
                let day = day_bounds(self.day, tz);
                if day.contains(now) {
                    now
                } else {
                    day.start
                }
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────
