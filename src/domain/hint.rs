//! Rate-limit hint extraction.
//!
//! Servers signal back-pressure with headers such as `Retry-After`. Some send a
//! number of seconds to wait, others an absolute date. The parser guesses which
//! one it is looking at:
//!
//! - a finite number in `0 <= v < SECONDS_IN_MONTH` is a relative delay in seconds;
//! - anything else is tried as an absolute time (HTTP-date in any of its three
//!   forms, RFC 3339, or a Unix timestamp in milliseconds for out-of-range
//!   numbers);
//! - if neither works the header yields no hint.
//!
//! The `x-rate-limit-reset` fallback follows the same rule, except that
//! out-of-range numbers are Unix timestamps in seconds, as servers send them.
//!
//! Absolute times are mapped onto the monotonic clock through the caller's
//! wall-clock reading, so a date in the past lands at or before `now`.

use crate::domain::headers::{HeaderValue, Headers};
use chrono::{DateTime, NaiveDateTime};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Threshold (31 days, in seconds) separating relative delays from timestamps.
pub const SECONDS_IN_MONTH: f64 = 2_678_400.0;

/// Default retry hint header.
pub const RETRY_AFTER: &str = "retry-after";

/// Remaining-quota header consulted when reset headers are enabled.
pub const RATE_LIMIT_REMAINING: &str = "x-rate-limit-remaining";

/// Quota-reset header consulted when reset headers are enabled.
pub const RATE_LIMIT_RESET: &str = "x-rate-limit-reset";

/// Obsolete HTTP-date forms: RFC 850 and ANSI C `asctime()`, both in UTC.
const LEGACY_HTTP_DATES: [&str; 2] = ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"];

/// A decoded hint, before it is anchored to a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    /// Wait this long from now.
    Relative(Duration),
    /// Do not call before this wall-clock time.
    Absolute(SystemTime),
}

impl Hint {
    /// Decode a retry hint value. Out-of-range numbers are epoch milliseconds.
    pub fn from_value(value: &HeaderValue) -> Option<Self> {
        Self::decode(value, 1.0)
    }

    /// Decode a quota-reset value. Out-of-range numbers are epoch seconds.
    pub fn from_reset_value(value: &HeaderValue) -> Option<Self> {
        Self::decode(value, 1000.0)
    }

    fn decode(value: &HeaderValue, millis_per_unit: f64) -> Option<Self> {
        if let Some(number) = value.as_number() {
            if number.is_finite() && (0.0..SECONDS_IN_MONTH).contains(&number) {
                return Duration::try_from_secs_f64(number)
                    .ok()
                    .map(Hint::Relative);
            }
            if number.is_finite() {
                return from_epoch_millis(number * millis_per_unit).map(Hint::Absolute);
            }
        }

        match value {
            HeaderValue::Text(text) => parse_date(text.trim()).map(Hint::Absolute),
            HeaderValue::Number(_) => None,
        }
    }

    /// Anchor the hint to the monotonic clock.
    ///
    /// `wall_now` must be the wall-clock reading taken at the same moment as `now`.
    pub fn resolve(&self, now: Instant, wall_now: SystemTime) -> Option<Instant> {
        match self {
            Hint::Relative(delay) => now.checked_add(*delay),
            Hint::Absolute(at) => match at.duration_since(wall_now) {
                Ok(ahead) => now.checked_add(ahead),
                Err(behind) => Some(now.checked_sub(behind.duration()).unwrap_or(now)),
            },
        }
    }
}

fn parse_date(text: &str) -> Option<SystemTime> {
    let millis = match DateTime::parse_from_rfc2822(text)
        .or_else(|_| DateTime::parse_from_rfc3339(text))
    {
        Ok(parsed) => parsed.timestamp_millis(),
        Err(_) => LEGACY_HTTP_DATES
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())?
            .and_utc()
            .timestamp_millis(),
    };
    from_epoch_millis(millis as f64)
}

fn from_epoch_millis(millis: f64) -> Option<SystemTime> {
    let abs = millis.abs();
    if !abs.is_finite() || abs >= u64::MAX as f64 {
        return None;
    }
    let offset = Duration::from_millis(abs.trunc() as u64)
        + Duration::from_nanos((abs.fract() * 1_000_000.0).round() as u64);
    if millis >= 0.0 {
        UNIX_EPOCH.checked_add(offset)
    } else {
        UNIX_EPOCH.checked_sub(offset)
    }
}

/// Turns reported headers into a not-before candidate.
///
/// The alias list is fixed at construction. Aliases are scanned in order and
/// the first one whose value decodes to a hint wins.
///
/// # Example
/// ```
/// use call_governor::{Headers, HintParser};
/// use std::time::{Duration, Instant, SystemTime};
///
/// let parser = HintParser::new();
/// let now = Instant::now();
/// let headers = Headers::new().with("Retry-After", "3");
///
/// let not_before = parser.parse(&headers, now, SystemTime::now()).unwrap();
/// assert_eq!(not_before, now + Duration::from_secs(3));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintParser {
    retry_after_aliases: Vec<String>,
    reset_headers: bool,
}

impl Default for HintParser {
    fn default() -> Self {
        Self {
            retry_after_aliases: vec![RETRY_AFTER.to_string()],
            reset_headers: false,
        }
    }
}

impl HintParser {
    /// Parser that only looks at `Retry-After`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the ordered list of retry hint header names.
    pub fn with_retry_after_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retry_after_aliases = aliases
            .into_iter()
            .map(|alias| alias.into().to_ascii_lowercase())
            .collect();
        self
    }

    /// Fall back to `x-rate-limit-reset` when `x-rate-limit-remaining` is `0`.
    pub fn with_reset_headers(mut self, enabled: bool) -> Self {
        self.reset_headers = enabled;
        self
    }

    /// Configured retry hint header names, lowercased, in scan order.
    pub fn retry_after_aliases(&self) -> &[String] {
        &self.retry_after_aliases
    }

    /// Whether the `x-rate-limit-*` fallback is enabled.
    pub fn reset_headers(&self) -> bool {
        self.reset_headers
    }

    /// Check whether this parser can ever produce a hint.
    pub fn is_inert(&self) -> bool {
        self.retry_after_aliases.is_empty() && !self.reset_headers
    }

    /// Decode the hint carried by `headers`, if any.
    pub fn extract(&self, headers: &Headers) -> Option<Hint> {
        let retry = self
            .retry_after_aliases
            .iter()
            .find_map(|alias| headers.get(alias).and_then(Hint::from_value));
        if retry.is_some() || !self.reset_headers {
            return retry;
        }

        let exhausted = headers
            .get(RATE_LIMIT_REMAINING)
            .and_then(HeaderValue::as_number)
            .is_some_and(|remaining| remaining == 0.0);
        if !exhausted {
            return None;
        }
        headers.get(RATE_LIMIT_RESET).and_then(Hint::from_reset_value)
    }

    /// Compute the not-before candidate for `headers`.
    pub fn parse(&self, headers: &Headers, now: Instant, wall_now: SystemTime) -> Option<Instant> {
        self.extract(headers)?.resolve(now, wall_now)
    }
}
