use derive_more::Display;
use log::trace;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::core::timespan::TimeUnit;

/// A stored timespan total, expressed in the declared unit of its metric.
///
/// Within storage it's persisted as the compact `[unit ordinal, amount]` array,
/// within snapshots it's exposed as `{"<unit name>": amount}`.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
#[display(fmt = "{} {}", amount, unit)]
pub struct TimespanValue {
    pub unit: TimeUnit,
    pub amount: u64,
}

impl TimespanValue {
    pub fn new(unit: TimeUnit, amount: u64) -> Self {
        Self { unit, amount }
    }

    /// Returns the persisted representation of this value.
    pub fn to_raw(&self) -> Value {
        Value::Array(vec![
            Value::from(self.unit.ordinal()),
            Value::from(self.amount),
        ])
    }
}

impl Serialize for TimespanValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.unit.name(), &self.amount)?;
        map.end()
    }
}

/// The outcome of decoding a persisted entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Valid(TimespanValue),
    /// The entry isn't a timespan and should be treated as absent.
    Skip(&'static str),
}

impl Decoded {
    /// Returns the decoded value when the entry was valid.
    pub fn valid(self) -> Option<TimespanValue> {
        match self {
            Decoded::Valid(value) => Some(value),
            Decoded::Skip(_) => None,
        }
    }
}

/// Decode a persisted entry into a [TimespanValue].
///
/// Accepted entries are a two-element array `[unit ordinal, amount]` with a known ordinal
/// and a non-negative integer amount, or a string containing such an array.
/// Anything else results in [Decoded::Skip].
pub fn decode(raw: &Value) -> Decoded {
    match raw {
        Value::Array(elements) => decode_elements(elements),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(elements)) => decode_elements(&elements),
            Ok(_) => Decoded::Skip("string doesn't contain an array"),
            Err(e) => {
                trace!("Persisted entry {:?} is not valid json, {}", text, e);
                Decoded::Skip("string is not valid json")
            }
        },
        _ => Decoded::Skip("unexpected entry type"),
    }
}

fn decode_elements(elements: &[Value]) -> Decoded {
    let [ordinal, amount] = elements else {
        return Decoded::Skip("expected exactly two elements");
    };

    let unit = match ordinal.as_u64().and_then(TimeUnit::from_ordinal) {
        Some(unit) => unit,
        None => return Decoded::Skip("unknown time unit ordinal"),
    };

    match amount.as_u64() {
        Some(amount) => Decoded::Valid(TimespanValue::new(unit, amount)),
        None => Decoded::Skip("amount is not a non-negative integer"),
    }
}
