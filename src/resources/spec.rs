//! Resource declarations and address parsing.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::resources::connector::ResourceError;

/// Kind of backing store a resource talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Relational,
    Cache,
    Document,
    Columnar,
    QueueProducer,
    QueueConsumer,
}

impl ResourceKind {
    /// Port assumed when an address omits one.
    pub fn default_port(self) -> u16 {
        match self {
            ResourceKind::Relational => 3306,
            ResourceKind::Cache => 6379,
            ResourceKind::Document => 27017,
            ResourceKind::Columnar => 9000,
            ResourceKind::QueueProducer | ResourceKind::QueueConsumer => 9092,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Relational => "relational",
            ResourceKind::Cache => "cache",
            ResourceKind::Document => "document",
            ResourceKind::Columnar => "columnar",
            ResourceKind::QueueProducer => "queue-producer",
            ResourceKind::QueueConsumer => "queue-consumer",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared external resource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourceSpec {
    /// Unique name, used for lookup and logs.
    pub name: String,

    /// Address or DSN. Accepts URLs (`mongodb://mongo:27017`), Go-style
    /// MySQL DSNs (`root:root@tcp(mysql:3306)/test`), broker lists
    /// (`kafka:9092,kafka-2:9092`) and bare `host[:port]`.
    pub address: String,

    pub kind: ResourceKind,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, address: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            kind,
        }
    }

    /// Resolve the network endpoint this spec points at.
    pub fn target(&self) -> Result<Target, ResourceError> {
        parse_target(&self.address, self.kind.default_port())
    }
}

/// Host and port extracted from an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

fn invalid(address: &str, reason: impl Into<String>) -> ResourceError {
    ResourceError::InvalidAddress {
        address: address.to_string(),
        reason: reason.into(),
    }
}

fn parse_target(address: &str, default_port: u16) -> Result<Target, ResourceError> {
    let trimmed = address.trim();
    // Broker lists: the first entry is enough to establish reachability.
    let first = trimmed.split(',').next().unwrap_or_default().trim();
    if first.is_empty() {
        return Err(invalid(address, "empty address"));
    }

    if first.contains("://") {
        let url = Url::parse(first).map_err(|e| invalid(address, e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| invalid(address, "missing host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        return Ok(Target {
            host,
            port: url.port().unwrap_or(default_port),
        });
    }

    if let Some(start) = first.find("tcp(") {
        let rest = &first[start + 4..];
        let end = rest
            .find(')')
            .ok_or_else(|| invalid(address, "unterminated tcp(...)"))?;
        return split_host_port(address, &rest[..end], default_port);
    }

    let without_user = first.rsplit_once('@').map_or(first, |(_, host)| host);
    let authority = without_user.split('/').next().unwrap_or_default();
    split_host_port(address, authority, default_port)
}

fn split_host_port(address: &str, authority: &str, default_port: u16) -> Result<Target, ResourceError> {
    if authority.is_empty() {
        return Err(invalid(address, "missing host"));
    }

    if let Some(rest) = authority.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| invalid(address, "unterminated IPv6 literal"))?;
        let port = match tail.strip_prefix(':') {
            Some(p) => parse_port(address, p)?,
            None if tail.is_empty() => default_port,
            None => return Err(invalid(address, "unexpected characters after IPv6 literal")),
        };
        return Ok(Target {
            host: host.to_string(),
            port,
        });
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => Ok(Target {
            host: host.to_string(),
            port: parse_port(address, port)?,
        }),
        Some(_) => Err(invalid(address, "missing host")),
        None => Ok(Target {
            host: authority.to_string(),
            port: default_port,
        }),
    }
}

fn parse_port(address: &str, port: &str) -> Result<u16, ResourceError> {
    port.parse::<u16>()
        .map_err(|_| invalid(address, format!("invalid port `{port}`")))
}
