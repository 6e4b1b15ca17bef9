//! Collection gate
//!
//! Decides whether a collection is due at a given instant. The gate never
//! mutates state; it only reads the status store.
//!
//! Two rules apply, in order:
//!
//! 1. **Hour restriction**: with an hour configured, only invocations during
//!    that hour of the day may collect.
//! 2. **Daily dedup**: with a status store configured, a collection already
//!    recorded on the same calendar day as `now` blocks another one,
//!    regardless of time of day.
//!
//! Calendar days are compared in the time zone of `now`, so the runner passes
//! local time.

use chrono::{DateTime, FixedOffset, TimeZone, Timelike};

use crate::error::Result;
use crate::status::StatusStore;

/// Outcome of a gate evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Collection may proceed
    Proceed,

    /// Outside the configured hour
    WrongHour { current: u32, expected: u8 },

    /// Already collected on this calendar day
    AlreadyCollected { last: DateTime<FixedOffset> },
}

impl GateDecision {
    /// Whether collection may proceed
    pub fn is_go(&self) -> bool {
        matches!(self, Self::Proceed)
    }
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proceed => write!(f, "collection due"),
            Self::WrongHour { current, expected } => {
                write!(f, "current hour {current:02} is not the collection hour {expected:02}")
            }
            Self::AlreadyCollected { last } => {
                write!(f, "already collected today at {}", last.to_rfc3339())
            }
        }
    }
}

/// Check the hour restriction alone
pub fn hour_matches<Tz: TimeZone>(now: &DateTime<Tz>, hour: Option<u8>) -> bool {
    match hour {
        Some(expected) => now.hour() == u32::from(expected),
        None => true,
    }
}

/// Whether `last` falls on the same calendar day as `now`, in `now`'s time zone
pub fn same_calendar_day<Tz: TimeZone>(now: &DateTime<Tz>, last: &DateTime<FixedOffset>) -> bool {
    last.with_timezone(&now.timezone()).date_naive() == now.date_naive()
}

/// Evaluate both gate rules
///
/// The status store is only read when the hour rule passes.
pub fn evaluate<Tz: TimeZone>(
    now: &DateTime<Tz>,
    hour: Option<u8>,
    status: Option<&StatusStore>,
) -> Result<GateDecision> {
    if let Some(expected) = hour {
        if !hour_matches(now, hour) {
            return Ok(GateDecision::WrongHour {
                current: now.hour(),
                expected,
            });
        }
    }

    if let Some(store) = status {
        if let Some(last) = store.last_collection_time()? {
            if same_calendar_day(now, &last) {
                return Ok(GateDecision::AlreadyCollected { last });
            }
        }
    }

    Ok(GateDecision::Proceed)
}

/// Whether a collection should run at `now`
pub fn should_collect<Tz: TimeZone>(
    now: &DateTime<Tz>,
    hour: Option<u8>,
    status: Option<&StatusStore>,
) -> Result<bool> {
    Ok(evaluate(now, hour, status)?.is_go())
}
