//! Data structures shared by the registry, discovery and aggregation
//! subsystems.
//!
//! An [`UpstreamAddress`] is the only identity an upstream policy engine
//! has: the `host:port` string learned from its announcement.  Two
//! addresses are the same upstream only if the strings match exactly.

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Address of one upstream server in `host:port` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpstreamAddress(String);

impl UpstreamAddress {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpstreamAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<SocketAddr> for UpstreamAddress {
    /// IPv6 hosts come out bracketed, e.g. `[::1]:1111`.
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl From<&str> for UpstreamAddress {
    fn from(addr: &str) -> Self {
        Self(addr.to_string())
    }
}

impl From<String> for UpstreamAddress {
    fn from(addr: String) -> Self {
        Self(addr)
    }
}

/// One successful answer collected during a fan-out round.
///
/// `document` is whatever the query function decoded from that upstream;
/// the aggregator never looks inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult<T> {
    pub address: UpstreamAddress,
    pub document: T,
}
