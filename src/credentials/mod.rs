//! The `credentials` module assembles the mutual-TLS identity of the fleet.
//!
//! A `CredentialBundle` is built once from three PEM files (client
//! certificate, client key, CA bundle) and then shared read-only by every
//! device simulator.

pub mod bundle;

pub use bundle::CredentialBundle;
