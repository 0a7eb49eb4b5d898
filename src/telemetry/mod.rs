//! The `telemetry` module defines what a simulated device emits: the
//! `Reading` data type and the codec that turns it into a broker payload.

pub mod codec;
pub mod reading;

pub use codec::{decode, encode};
pub use reading::{MAX_VALUE, Reading, TIMESTAMP_FORMAT};
