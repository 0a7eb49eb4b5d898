//! # SensorFleet
//!
//! `sensorfleet` simulates a fleet of temperature sensors. Every simulated
//! device holds its own mutually authenticated TLS connection to a Kafka broker and
//! periodically publishes a JSON reading to a single topic.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `config`: Loads settings from `config/default.*`, `.env` and the environment.
//! - `credentials`: Loads the client certificate, private key and CA trust store.
//! - `telemetry`: The `Reading` type and its canonical wire encoding.
//! - `transport`: Kafka bootstrap endpoint, mutual-TLS dialer and the publisher session.
//! - `simulator`: The per-device publish loop and the fleet that runs N of them.
//! - `utils`: Shared error types and logging setup.

pub mod config;
pub mod credentials;
pub mod simulator;
pub mod telemetry;
pub mod transport;
pub mod utils;
