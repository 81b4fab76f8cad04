//! Host address value type.
//!
//! Replica-set members are identified by a `"host:port"` pair. Addresses are
//! compared by value and case-sensitively; the canonical string form is the
//! one members gossip about each other in `isMaster` replies.

use crate::error::{ReplSetError, Result};
use std::fmt;
use std::str::FromStr;

/// A `(hostname, port)` pair identifying one replica-set member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostAndPort {
    host: String,
    port: u16,
}

impl HostAndPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for HostAndPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for HostAndPort {
    type Err = ReplSetError;

    /// Parses the canonical `"host:port"` form.
    ///
    /// The split is on the last `:` so IPv6-ish host strings with embedded
    /// colons still find their port. Both parts must be non-empty and the
    /// port must be a valid `u16`.
    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ReplSetError::InvalidAddress(s.to_string()))?;
        if host.is_empty() {
            return Err(ReplSetError::InvalidAddress(s.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| ReplSetError::InvalidAddress(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}
