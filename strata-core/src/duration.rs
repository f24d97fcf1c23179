//! Time precision and shard duration resolution.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, ProvisionResult};

/// The time precision of a database.
///
/// Fixed at creation time; every timestamp and shard duration in the database
/// is expressed in ticks of this unit.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum TimePrecision {
    Second,
    Millisecond,
    Microsecond,
    Nanosecond,
}

impl TimePrecision {
    /// The precision index used in the persisted descriptor record.
    pub fn index(&self) -> u8 {
        match self {
            Self::Second => 0,
            Self::Millisecond => 1,
            Self::Microsecond => 2,
            Self::Nanosecond => 3,
        }
    }

    /// The number of ticks per second at this precision.
    pub fn factor(&self) -> u64 {
        1000u64.pow(u32::from(self.index()))
    }

    /// All supported precisions, in ascending resolution.
    pub fn all() -> [TimePrecision; 4] {
        [Self::Second, Self::Millisecond, Self::Microsecond, Self::Nanosecond]
    }

    /// The long-form name shown in prompts.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Second => "seconds",
            Self::Millisecond => "milliseconds",
            Self::Microsecond => "microseconds",
            Self::Nanosecond => "nanoseconds",
        }
    }
}

impl FromStr for TimePrecision {
    type Err = ProvisionError;

    fn from_str(s: &str) -> ProvisionResult<Self> {
        match s {
            "s" => Ok(Self::Second),
            "ms" => Ok(Self::Millisecond),
            "us" => Ok(Self::Microsecond),
            "ns" => Ok(Self::Nanosecond),
            other => Err(ProvisionError::InvalidInput(format!(
                "time precision must be either 's' (seconds), 'ms' (milliseconds), \
                 'us' (microseconds) or 'ns' (nanoseconds) but received {:?}",
                other,
            ))),
        }
    }
}

impl fmt::Display for TimePrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Second => "s",
                Self::Millisecond => "ms",
                Self::Microsecond => "us",
                Self::Nanosecond => "ns",
            }
        )
    }
}

/// The fixed table of symbolic shard spans: symbol, base seconds, description.
pub const DURATIONS: [(&str, u64, &str); 11] = [
    ("1h", 3_600, "1 hour"),
    ("2h", 7_200, "2 hours"),
    ("6h", 21_600, "6 hours"),
    ("12h", 43_200, "12 hours"),
    ("1d", 86_400, "1 day"),
    ("2d", 172_800, "2 days"),
    ("4d", 345_600, "4 days"),
    ("1w", 604_800, "1 week"),
    ("10d", 864_000, "10 days"),
    ("2w", 1_209_600, "2 weeks"),
    ("4w", 2_419_200, "4 weeks"),
];

/// A shard duration as supplied by a caller.
///
/// Durations arrive either as a raw tick count (when copied from an existing
/// cluster) or as one of the symbolic spans from the fixed table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DurationSpec {
    /// A duration already expressed in native ticks.
    Ticks(u64),
    /// A symbolic span such as "1d" or "1w".
    Span(String),
}

impl FromStr for DurationSpec {
    type Err = ProvisionError;

    fn from_str(s: &str) -> ProvisionResult<Self> {
        if s.is_empty() {
            return Err(ProvisionError::InvalidInput("empty duration".into()));
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            let ticks = s
                .parse()
                .map_err(|_| ProvisionError::InvalidInput(format!("invalid duration: {:?}", s)))?;
            return Ok(Self::Ticks(ticks));
        }
        Ok(Self::Span(s.to_string()))
    }
}

impl From<u64> for DurationSpec {
    fn from(ticks: u64) -> Self {
        Self::Ticks(ticks)
    }
}

/// Resolve a duration to the tick count stored in the descriptor.
///
/// Raw tick counts pass through unchanged. Symbolic spans are looked up in the
/// fixed table and scaled from base seconds to the database's precision.
pub fn resolve_duration(spec: &DurationSpec, precision: TimePrecision) -> ProvisionResult<u64> {
    match spec {
        DurationSpec::Ticks(ticks) => Ok(*ticks),
        DurationSpec::Span(span) => DURATIONS
            .iter()
            .find(|(symbol, _, _)| symbol == span)
            .map(|(_, seconds, _)| seconds * precision.factor())
            .ok_or_else(|| {
                ProvisionError::InvalidInput(format!(
                    "unknown duration {:?}, expecting one of: {}",
                    span,
                    DURATIONS.iter().map(|(symbol, _, _)| *symbol).collect::<Vec<_>>().join(", "),
                ))
            }),
    }
}
