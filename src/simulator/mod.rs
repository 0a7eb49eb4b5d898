//! The `simulator` module drives the simulated devices.
//!
//! `device` holds the per-device publish loop and its retry policy; `fleet`
//! starts N devices concurrently and collects what each of them did.

pub mod device;
pub mod fleet;

pub use device::{DEFAULT_SEND_INTERVAL, DeviceConfig, DeviceReport, DeviceSimulator, DeviceState, RetryPolicy};
pub use fleet::{DeviceFailure, Fleet, FleetConfig, FleetReport, device_id};
