//! Observation and batch types handed to the transport.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

/// Kind of metric a source reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Point-in-time measurement
    Gauge,
    /// Monotonically increasing count
    Counter,
}

impl MetricKind {
    /// Lowercase name, as used on the wire and in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw value pushed by a producer.
///
/// Either a bare value or a record of named fields that gets merged into
/// the resulting [`Observation`].
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    /// Stored as the observation's `value`
    Value(Value),
    /// Merged field by field
    Record(Map<String, Value>),
}

macro_rules! measurement_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Measurement {
                fn from(value: $ty) -> Self {
                    Measurement::Value(Value::from(value))
                }
            }
        )*
    };
}

measurement_from_number!(i32, i64, u32, u64, f32, f64);

impl From<Map<String, Value>> for Measurement {
    fn from(record: Map<String, Value>) -> Self {
        Measurement::Record(record)
    }
}

impl From<Value> for Measurement {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(record) => Measurement::Record(record),
            other => Measurement::Value(other),
        }
    }
}

/// A normalized data point, ready to be batched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Name of the source that produced it
    pub name: String,
    /// Measured value, absent for records without a `value` field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Optional source label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Epoch seconds
    pub measure_time: i64,
    /// Any other fields carried over from a record
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Observation {
    /// Build an observation for `name` from a raw measurement.
    ///
    /// Record keys `value`, `source` and `measure_time` fill the matching
    /// fields. A non-string `source` replaces the label and is sent as is.
    /// Any numeric `measure_time` is truncated to whole seconds and
    /// replaces `now`; other types are logged and ignored. A record's
    /// `name` never replaces the source name. Everything else lands in
    /// `fields`.
    pub fn normalize(
        name: &str,
        measurement: Measurement,
        source: Option<&str>,
        now: i64,
    ) -> Self {
        let mut observation = Observation {
            name: name.to_string(),
            value: None,
            source: source.map(str::to_string),
            measure_time: now,
            fields: Map::new(),
        };

        match measurement {
            Measurement::Value(value) => observation.value = Some(value),
            Measurement::Record(record) => {
                for (key, value) in record {
                    match key.as_str() {
                        "name" => {},
                        "value" => observation.value = Some(value),
                        "source" => match value {
                            Value::String(label) => observation.source = Some(label),
                            Value::Null => observation.source = None,
                            other => {
                                // Sent as given, in place of the configured label
                                observation.source = None;
                                observation.fields.insert(key, other);
                            },
                        },
                        "measure_time" => match epoch_seconds(&value) {
                            Some(ts) => observation.measure_time = ts,
                            None => warn!(
                                name,
                                measure_time = %value,
                                "non-numeric measure_time ignored"
                            ),
                        },
                        _ => {
                            observation.fields.insert(key, value);
                        },
                    }
                }
            },
        }

        observation
    }
}

/// Whole epoch seconds from an integer or a float timestamp
#[allow(clippy::cast_possible_truncation)]
fn epoch_seconds(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_u64().map(|ts| i64::try_from(ts).unwrap_or(i64::MAX)))
        .or_else(|| value.as_f64().filter(|ts| ts.is_finite()).map(|ts| ts.trunc() as i64))
}

/// Observations accumulated between two flushes, split by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Gauge observations in arrival order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gauges: Vec<Observation>,
    /// Counter observations in arrival order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub counters: Vec<Observation>,
}

impl Batch {
    /// Append an observation of the given kind
    pub fn push(&mut self, kind: MetricKind, observation: Observation) {
        match kind {
            MetricKind::Gauge => self.gauges.push(observation),
            MetricKind::Counter => self.counters.push(observation),
        }
    }

    /// Combined gauge and counter count
    pub fn len(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }

    /// True when neither side holds anything
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }
}
