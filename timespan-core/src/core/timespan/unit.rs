use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::core::timespan::TimespanError;

const NANOS_PER_MICROSECOND: u64 = 1_000;
const NANOS_PER_MILLISECOND: u64 = 1_000_000;
const NANOS_PER_SECOND: u64 = 1_000_000_000;
const NANOS_PER_MINUTE: u64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u64 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: u64 = 24 * NANOS_PER_HOUR;

/// The resolution in which a timespan is stored and reported.
///
/// The declaration order is the persisted ordinal of the unit and should never change.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[display(fmt = "nanosecond")]
    Nanosecond,
    #[display(fmt = "microsecond")]
    Microsecond,
    #[display(fmt = "millisecond")]
    Millisecond,
    #[display(fmt = "second")]
    Second,
    #[display(fmt = "minute")]
    Minute,
    #[display(fmt = "hour")]
    Hour,
    #[display(fmt = "day")]
    Day,
}

impl TimeUnit {
    /// All known units, indexed by their ordinal.
    pub const ALL: [TimeUnit; 7] = [
        TimeUnit::Nanosecond,
        TimeUnit::Microsecond,
        TimeUnit::Millisecond,
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
        TimeUnit::Day,
    ];

    /// Returns the amount of nanoseconds within one unit.
    pub fn factor(&self) -> u64 {
        match self {
            TimeUnit::Nanosecond => 1,
            TimeUnit::Microsecond => NANOS_PER_MICROSECOND,
            TimeUnit::Millisecond => NANOS_PER_MILLISECOND,
            TimeUnit::Second => NANOS_PER_SECOND,
            TimeUnit::Minute => NANOS_PER_MINUTE,
            TimeUnit::Hour => NANOS_PER_HOUR,
            TimeUnit::Day => NANOS_PER_DAY,
        }
    }

    /// Returns the ordinal used within the persisted representation of this unit.
    pub fn ordinal(&self) -> u64 {
        *self as u64
    }

    /// Retrieve the unit for the given persisted ordinal.
    ///
    /// It returns [None] when the ordinal is out of range.
    pub fn from_ordinal(ordinal: u64) -> Option<Self> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|index| Self::ALL.get(index))
            .copied()
    }

    /// Returns the lowercase name of this unit.
    pub fn name(&self) -> &'static str {
        match self {
            TimeUnit::Nanosecond => "nanosecond",
            TimeUnit::Microsecond => "microsecond",
            TimeUnit::Millisecond => "millisecond",
            TimeUnit::Second => "second",
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = TimespanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();

        Self::ALL
            .iter()
            .find(|unit| unit.name() == normalized.as_str())
            .copied()
            .ok_or_else(|| TimespanError::UnknownTimeUnit(value.to_string()))
    }
}

/// Convert the `amount` expressed in `from` into the `to` unit.
///
/// The conversion truncates towards zero, e.g. 90 seconds converted to minutes results in 1.
/// Results which don't fit within 64 bits saturate at [u64::MAX].
pub fn convert(from: TimeUnit, amount: u64, to: TimeUnit) -> u64 {
    if from == to {
        return amount;
    }

    let nanos = amount as u128 * from.factor() as u128;
    u64::try_from(nanos / to.factor() as u128).unwrap_or(u64::MAX)
}

/// Convert the `amount` expressed in the given unit into nanoseconds.
pub fn to_nanos(unit: TimeUnit, amount: u64) -> u128 {
    amount as u128 * unit.factor() as u128
}
