// crates/media-gate-core/src/core/time.rs
// ============================================================================
// Module: Media Gate Time Model
// Description: Canonical timestamps, UTC calendar dates, and injectable clocks.
// Purpose: Keep window, expiry, and daily-reset arithmetic deterministic.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Media Gate never reads wall-clock time inside its evaluation logic. Every
//! component receives a [`Clock`] and asks it for the current [`Timestamp`],
//! which keeps rate windows, block expiry, and daily quota rollover testable
//! with a [`ManualClock`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use time::Date;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Milliseconds per second.
pub const MILLIS_PER_SECOND: i64 = 1_000;
/// Seconds per hour.
pub const SECONDS_PER_HOUR: i64 = 3_600;
/// Seconds per day.
pub const SECONDS_PER_DAY: i64 = 86_400;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Unix epoch timestamp with millisecond resolution.
///
/// # Invariants
/// - Arithmetic saturates instead of overflowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Creates a timestamp from unix epoch seconds.
    #[must_use]
    pub const fn from_unix_seconds(seconds: i64) -> Self {
        Self(seconds.saturating_mul(MILLIS_PER_SECOND))
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the timestamp as whole unix epoch seconds (floored).
    #[must_use]
    pub const fn as_unix_seconds(self) -> i64 {
        self.0.div_euclid(MILLIS_PER_SECOND)
    }

    /// Returns a timestamp `seconds` later.
    #[must_use]
    pub const fn plus_seconds(self, seconds: i64) -> Self {
        Self(self.0.saturating_add(seconds.saturating_mul(MILLIS_PER_SECOND)))
    }

    /// Returns a timestamp `seconds` earlier.
    #[must_use]
    pub const fn minus_seconds(self, seconds: i64) -> Self {
        Self(self.0.saturating_sub(seconds.saturating_mul(MILLIS_PER_SECOND)))
    }

    /// Returns the milliseconds elapsed since `earlier` (negative if `earlier` is later).
    #[must_use]
    pub const fn millis_since(self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Returns the UTC calendar date containing this timestamp.
    #[must_use]
    pub fn utc_date(self) -> CalendarDate {
        CalendarDate(self.to_offset_datetime().date())
    }

    /// Renders the timestamp as an RFC 3339 UTC string.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        self.to_offset_datetime().format(&Rfc3339).unwrap_or_else(|_| self.0.to_string())
    }

    /// Converts to an [`OffsetDateTime`], clamping out-of-range values to the epoch.
    fn to_offset_datetime(self) -> OffsetDateTime {
        let nanos = i128::from(self.0) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

// ============================================================================
// SECTION: Calendar Date
// ============================================================================

/// UTC calendar date used as the daily quota reset marker.
///
/// # Invariants
/// - Serializes as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarDate(Date);

impl CalendarDate {
    /// Parses an ISO `YYYY-MM-DD` date.
    ///
    /// # Errors
    ///
    /// Returns [`DateParseError`] when the input is not a valid date.
    pub fn parse_iso(value: &str) -> Result<Self, DateParseError> {
        let format = format_description!("[year]-[month]-[day]");
        Date::parse(value.trim(), &format)
            .map(Self)
            .map_err(|err| DateParseError(format!("{value}: {err}")))
    }

    /// Returns the date as an ISO `YYYY-MM-DD` string.
    #[must_use]
    pub fn to_iso_string(self) -> String {
        format!("{:04}-{:02}-{:02}", self.0.year(), u8::from(self.0.month()), self.0.day())
    }

    /// Returns the timestamp of UTC midnight at the start of this date.
    #[must_use]
    pub fn start(self) -> Timestamp {
        Timestamp::from_unix_seconds(self.0.midnight().assume_utc().unix_timestamp())
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso_string())
    }
}

impl Serialize for CalendarDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso_string())
    }
}

impl<'de> Deserialize<'de> for CalendarDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_iso(&raw).map_err(serde::de::Error::custom)
    }
}

/// Calendar date parse failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid calendar date: {0}")]
pub struct DateParseError(String);

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Timestamp::from_unix_millis(i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
    }
}

/// Manually advanced clock for deterministic tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current unix epoch milliseconds.
    millis: AtomicI64,
}

impl ManualClock {
    /// Creates a manual clock starting at `start`.
    #[must_use]
    pub const fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(start.as_unix_millis()),
        }
    }

    /// Moves the clock to `at`.
    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.as_unix_millis(), Ordering::SeqCst);
    }

    /// Advances the clock by whole seconds.
    pub fn advance_seconds(&self, seconds: i64) {
        self.millis.fetch_add(seconds.saturating_mul(MILLIS_PER_SECOND), Ordering::SeqCst);
    }

    /// Advances the clock by milliseconds.
    pub fn advance_millis(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.millis.load(Ordering::SeqCst))
    }
}
