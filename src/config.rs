use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::discovery::announcer;

/// Command-line flags. Unset flags leave lower configuration layers alone.
#[derive(Debug, Default, Serialize, clap::Parser)]
#[command(name = "api-aggregator", version, about = "Policy engine API aggregator")]
pub struct Cli {
    /// Address in form of ip:port to listen on for http
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_addr: Option<SocketAddr>,

    /// Address in form of ip:port to listen on for multicast
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multicast_addr: Option<SocketAddr>,

    /// Address in form of ip:port to announce ourselves via multicast
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multicast_ping: Option<SocketAddr>,

    /// Seconds between multicast pings
    #[arg(long = "multicast-interval")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multicast_interval_secs: Option<u64>,

    /// Seconds before a request to an upstream server is abandoned
    #[arg(long = "upstream-timeout")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub http_addr: SocketAddr,
    pub multicast_addr: SocketAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multicast_ping: Option<SocketAddr>,
    pub multicast_interval_secs: u64,
    pub upstream_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            multicast_addr: SocketAddr::from(([224, 0, 0, 1], 8888)),
            multicast_ping: None,
            multicast_interval_secs: announcer::DEFAULT_INTERVAL.as_secs(),
            upstream_timeout_secs: 10,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let config: Config = Self::figment(cli)
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn figment(cli: &Cli) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("aggregator.toml"))
            .merge(Json::file("aggregator.json"))
            .merge(Env::prefixed("AGGREGATOR_"))
            .merge(Serialized::defaults(cli))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.multicast_ping == Some(self.multicast_addr) {
            anyhow::bail!(
                "cannot announce ourselves to the same address that we listen on for multicast"
            );
        }
        if self.multicast_interval_secs == 0 {
            anyhow::bail!("multicast interval must be at least one second");
        }
        if self.upstream_timeout_secs == 0 {
            anyhow::bail!("upstream timeout must be at least one second");
        }
        Ok(())
    }

    pub fn multicast_interval(&self) -> Duration {
        Duration::from_secs(self.multicast_interval_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_announcing_to_own_group_rejected() {
        let config = Config {
            multicast_ping: Some(SocketAddr::from(([224, 0, 0, 1], 8888))),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli {
            http_addr: Some(SocketAddr::from(([127, 0, 0, 1], 9000))),
            multicast_interval_secs: Some(5),
            ..Cli::default()
        };
        let config: Config = Config::figment(&cli).extract().unwrap();

        assert_eq!(config.http_addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(config.multicast_interval(), Duration::from_secs(5));
        assert_eq!(config.multicast_addr, Config::default().multicast_addr);
        assert_eq!(config.multicast_ping, None);
    }
}
