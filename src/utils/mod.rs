//! The `utils` module provides the pieces shared by every stage of
//! `sensorfleet`: the error taxonomy and logging setup.

pub mod error;
pub mod logging;
