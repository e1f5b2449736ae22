//! Aggregating gateway for multicast-discovered policy engines.
//!
//! Upstream servers announce their HTTP port over UDP multicast and land in
//! a shared [`Registry`].  Every inbound query fans out to all registered
//! upstreams at once; the answers are merged into one response and the
//! upstreams that failed are dropped from the registry until they announce
//! themselves again.

pub mod aggregator;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod http_server;
pub mod registry;
pub mod types;

pub use aggregator::fan_out;
pub use client::UpstreamClient;
pub use registry::{Notifications, Registry};
pub use types::{AggregateResult, UpstreamAddress};
