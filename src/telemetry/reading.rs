use chrono::{DateTime, FixedOffset, Local, SubsecRound};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire format of `timestamp`, e.g. `2023-01-02T15:04:05-0700`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Readings are drawn from `[0, MAX_VALUE)`.
pub const MAX_VALUE: f64 = 100.0;

/// One temperature sample from a simulated device.
///
/// Serializes to the payload record
/// `{"timestamp": "...", "sensor": "...", "temperature": ...}` with the
/// fields in exactly that order. The correlation id is not part of the
/// payload: it travels as the broker message key, so a decoded reading is
/// given a fresh one.
///
/// # Example
///
/// ```rust
/// use sensorfleet::telemetry::Reading;
///
/// let reading = Reading::generate("sensor-1");
/// assert!((0.0..100.0).contains(&reading.value));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(with = "wire_timestamp")]
    pub timestamp: DateTime<FixedOffset>,
    #[serde(rename = "sensor")]
    pub device_id: String,
    #[serde(rename = "temperature")]
    pub value: f64,
    #[serde(skip, default = "Uuid::new_v4")]
    pub correlation_id: Uuid,
}

impl Reading {
    pub fn new(device_id: impl Into<String>, timestamp: DateTime<FixedOffset>, value: f64) -> Self {
        Self {
            timestamp,
            device_id: device_id.into(),
            value,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// A fresh reading stamped with the local time, truncated to whole
    /// seconds so it matches what goes on the wire.
    pub fn generate(device_id: &str) -> Self {
        let value = rand::thread_rng().gen_range(0.0..MAX_VALUE);
        let timestamp = Local::now().trunc_subsecs(0).fixed_offset();
        Self::new(device_id, timestamp, value)
    }

    /// Broker message key for this reading.
    pub fn key(&self) -> String {
        self.correlation_id.to_string()
    }
}

mod wire_timestamp {
    use chrono::{DateTime, FixedOffset};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(ts: &DateTime<FixedOffset>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&ts.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<FixedOffset>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}
