//! The `transport` module is responsible for talking to the broker.
//!
//! It holds the Kafka bootstrap endpoint, the producer seam, the
//! mutual-TLS Kafka dialer, and the publisher session that owns one
//! producer.

pub mod dialer;
pub mod endpoint;
pub mod producer;
pub mod session;

pub use dialer::{DEFAULT_DIAL_TIMEOUT, Dialer};
pub use endpoint::Endpoint;
pub use producer::{Connector, KafkaProducer, Producer};
pub use session::{AckLevel, DEFAULT_WRITE_TIMEOUT, Session, SessionOptions};
