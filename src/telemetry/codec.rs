//! Message codec
//!
//! Turns a `Reading` into the JSON payload published to the broker and back.
//! Encoding is deterministic; the only failure is a value JSON cannot carry.

use crate::telemetry::reading::Reading;
use crate::utils::error::EncodingError;

pub fn encode(reading: &Reading) -> Result<Vec<u8>, EncodingError> {
    if !reading.value.is_finite() {
        return Err(EncodingError::NonFinite {
            device: reading.device_id.clone(),
            value: reading.value,
        });
    }
    Ok(serde_json::to_vec(reading)?)
}

pub fn decode(payload: &[u8]) -> Result<Reading, EncodingError> {
    Ok(serde_json::from_slice(payload)?)
}
