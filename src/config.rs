//! Configuration types for meta-walker
//!
//! This module defines:
//! - Endpoint address parsing
//! - RPC timeout/retry settings
//! - Walk configuration with validation

use crate::error::ConfigError;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

/// Maximum reasonable concurrency bound for one walk
pub const MAX_THREADS: usize = 512;

/// Default per-RPC timeout
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of retries after the first attempt
pub const DEFAULT_RETRY_TIMES: u32 = 3;

/// Default fixed delay between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Regex for endpoint addresses
static ENDPOINT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    // Matches: host:port, 10.0.0.1:7400 or [::1]:7400
    Regex::new(r"^(\[[0-9A-Fa-f:.]+\]|[A-Za-z0-9][A-Za-z0-9.\-]*):(\d{1,5})$")
        .expect("Invalid endpoint regex")
});

/// Network address of one metadata-shard replica
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Parse a `host:port` address
    ///
    /// Accepts formats:
    /// - mds1.cluster:7400
    /// - 10.0.0.1:7400
    /// - [fe80::1]:7400
    pub fn parse(addr: &str) -> Result<Self, ConfigError> {
        let addr = addr.trim();

        let caps = ENDPOINT_REGEX
            .captures(addr)
            .ok_or_else(|| ConfigError::InvalidEndpoint {
                addr: addr.to_string(),
                reason: "Expected format: host:port".into(),
            })?;

        let port = caps[2]
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEndpoint {
                addr: addr.to_string(),
                reason: format!("Bad port: {}", e),
            })?;

        if port == 0 {
            return Err(ConfigError::InvalidEndpoint {
                addr: addr.to_string(),
                reason: "Port must not be 0".into(),
            });
        }

        Ok(Self {
            host: caps[1].to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse a comma-separated address list, ignoring empty items
pub fn parse_endpoints(list: &str) -> Result<Vec<Endpoint>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Endpoint::parse)
        .collect()
}

/// Per-RPC timeout and retry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcConfig {
    /// Timeout of a single attempt
    pub timeout: Duration,

    /// Retries after the first attempt
    pub retry_times: u32,

    /// Fixed delay before each retry
    pub retry_delay: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RPC_TIMEOUT,
            retry_times: DEFAULT_RETRY_TIMES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RpcConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(self.timeout));
        }
        Ok(())
    }
}

/// Validated runtime configuration for bulk walks
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// Concurrency bound K for one walk
    pub threads: usize,

    /// RPC settings
    pub rpc: RpcConfig,

    /// Coordinator endpoints serving filesystem info
    pub coordinator_addrs: Vec<Endpoint>,
}

impl WalkConfig {
    /// Create a config with default threads and RPC settings
    pub fn new(coordinator_addrs: Vec<Endpoint>) -> Self {
        Self {
            threads: default_threads(),
            rpc: RpcConfig::default(),
            coordinator_addrs,
        }
    }

    /// Build from a comma-separated coordinator address list
    pub fn from_addrs(addrs: &str) -> Result<Self, ConfigError> {
        let config = Self::new(parse_endpoints(addrs)?);
        config.validate()?;
        Ok(config)
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn rpc(mut self, rpc: RpcConfig) -> Self {
        self.rpc = rpc;
        self
    }

    /// Check thread count, timeout and coordinator list
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 || self.threads > MAX_THREADS {
            return Err(ConfigError::InvalidThreadCount {
                count: self.threads,
                max: MAX_THREADS,
            });
        }

        self.rpc.validate()?;

        if self.coordinator_addrs.is_empty() {
            return Err(ConfigError::NoCoordinator);
        }

        Ok(())
    }
}

fn default_threads() -> usize {
    // Walks are RPC bound, not CPU bound
    (num_cpus::get() * 2).min(MAX_THREADS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint_hostname() {
        let ep = Endpoint::parse("mds1.cluster.local:7400").unwrap();
        assert_eq!(ep.host(), "mds1.cluster.local");
        assert_eq!(ep.port(), 7400);
        assert_eq!(ep.to_string(), "mds1.cluster.local:7400");
    }

    #[test]
    fn test_parse_endpoint_ipv6() {
        let ep = Endpoint::parse("[fe80::1]:7401").unwrap();
        assert_eq!(ep.host(), "[fe80::1]");
        assert_eq!(ep.port(), 7401);
    }

    #[test]
    fn test_parse_endpoint_invalid() {
        assert!(Endpoint::parse("mds1").is_err());
        assert!(Endpoint::parse(":7400").is_err());
        assert!(Endpoint::parse("mds1:0").is_err());
        assert!(Endpoint::parse("mds1:99999").is_err());
        assert!(Endpoint::parse("http://mds1:7400").is_err());
    }

    #[test]
    fn test_parse_endpoint_list() {
        let eps = parse_endpoints("10.0.0.1:7400, 10.0.0.2:7400,,").unwrap();
        assert_eq!(eps.len(), 2);
        assert_eq!(eps[1].host(), "10.0.0.2");

        assert!(parse_endpoints("10.0.0.1:7400,bogus").is_err());
    }

    #[test]
    fn test_validate_threads() {
        let eps = parse_endpoints("10.0.0.1:7400").unwrap();
        assert!(WalkConfig::new(eps.clone()).threads(8).validate().is_ok());
        assert_eq!(
            WalkConfig::new(eps.clone()).threads(0).validate(),
            Err(ConfigError::InvalidThreadCount {
                count: 0,
                max: MAX_THREADS
            })
        );
        assert!(WalkConfig::new(eps).threads(MAX_THREADS + 1).validate().is_err());
    }

    #[test]
    fn test_validate_rpc_and_coordinator() {
        let zero_timeout = RpcConfig {
            timeout: Duration::ZERO,
            ..RpcConfig::default()
        };
        assert!(zero_timeout.validate().is_err());

        assert_eq!(
            WalkConfig::new(Vec::new()).threads(1).validate(),
            Err(ConfigError::NoCoordinator)
        );
        assert!(WalkConfig::from_addrs("10.0.0.1:7400").is_ok());
    }
}
