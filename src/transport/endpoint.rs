use crate::utils::error::ConnectError;

const DEFAULT_PORT: u16 = 9092;

/// Where a session produces: bootstrap broker, topic and optional partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    topic: String,
    partition: Option<u32>,
}

impl Endpoint {
    /// Accepts a Kafka bootstrap address, `host:port` or `[v6]:port`.
    /// The port defaults to 9092.
    pub fn parse(
        address: &str,
        topic: impl Into<String>,
        partition: Option<u32>,
    ) -> Result<Self, ConnectError> {
        let invalid = |reason: &str| ConnectError::InvalidEndpoint {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty address"));
        }
        if trimmed.contains("://") || trimmed.contains('/') {
            return Err(invalid("expected host:port"));
        }

        let (host, port) = if let Some(rest) = trimmed.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 address"))?;
            match tail {
                "" => (host, None),
                _ => {
                    let port = tail
                        .strip_prefix(':')
                        .ok_or_else(|| invalid("expected :port after IPv6 address"))?;
                    (host, Some(port))
                }
            }
        } else {
            match trimmed.split_once(':') {
                Some((_, port)) if port.contains(':') => {
                    return Err(invalid("IPv6 addresses must be bracketed"));
                }
                Some((host, port)) => (host, Some(port)),
                None => (trimmed, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid("invalid port"))?,
            None => DEFAULT_PORT,
        };
        if port == 0 {
            return Err(invalid("invalid port"));
        }

        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(invalid("topic must not be empty"));
        }
        if partition.is_some_and(|p| i32::try_from(p).is_err()) {
            return Err(invalid("partition out of range"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            topic,
            partition,
        })
    }

    /// Host without IPv6 brackets; also the TLS server name.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> Option<u32> {
        self.partition
    }

    /// Partition the session produces to; 0 when none was configured.
    pub fn partition_index(&self) -> i32 {
        self.partition
            .and_then(|p| i32::try_from(p).ok())
            .unwrap_or(0)
    }

    /// `host:port` as handed to the Kafka client.
    pub fn bootstrap(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
