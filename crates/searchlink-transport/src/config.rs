use crate::dead_pool::DeadPoolConfig;
use crate::selector::SelectorKind;
use searchlink_common::{NodeDescriptor, Result, SearchlinkError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Upper bound accepted for `max_dead_timeout_secs`: one week
pub const MAX_DEAD_TIMEOUT_SECS: u64 = 7 * 24 * 3600;

/// Transport configuration.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides:
///
/// ```json
/// {
///   "hosts": ["http://10.0.0.1:9200", "10.0.0.2"],
///   "max_retries": 2,
///   "sniff_on_start": true,
///   "selector": "sticky_round_robin"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Seed hosts (`http://host:port/prefix`, `host:port` or `host`)
    pub hosts: Vec<String>,
    /// Retries after the initial attempt.
    ///
    /// Total attempts = max_retries + 1
    /// Default: 3
    pub max_retries: usize,
    /// Quarantine after a node's first failure, in seconds.
    /// Default: 60
    pub dead_timeout_secs: u64,
    /// Upper bound on the escalating quarantine, in seconds.
    /// Default: 3600
    pub max_dead_timeout_secs: u64,
    /// Quarantine growth per consecutive failure.
    /// Default: 2.0 (doubles each time)
    pub dead_backoff_multiplier: f64,
    /// Shuffle the seed hosts once at construction.
    /// Default: true
    pub randomize_hosts: bool,
    /// Sniff before the first request.
    pub sniff_on_start: bool,
    /// Sniff every N requests. `None` disables.
    pub sniff_after_requests: Option<u64>,
    /// Sniff right after a connection failure.
    pub sniff_on_connection_fail: bool,
    pub selector: SelectorKind,
    /// TCP connect timeout, in milliseconds.
    /// Default: 5000
    pub connect_timeout_ms: u64,
    /// Timeout for one full HTTP exchange, in milliseconds.
    /// Default: 30000
    pub request_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            hosts: vec![format!("http://localhost:{}", searchlink_common::DEFAULT_PORT)],
            max_retries: 3,
            dead_timeout_secs: 60,
            max_dead_timeout_secs: 3600,
            dead_backoff_multiplier: 2.0,
            randomize_hosts: true,
            sniff_on_start: false,
            sniff_after_requests: None,
            sniff_on_connection_fail: false,
            selector: SelectorKind::RoundRobin,
            connect_timeout_ms: 5000,
            request_timeout_ms: 30000,
        }
    }
}

impl TransportConfig {
    /// Config with the given seed hosts and defaults for everything else.
    pub fn with_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Loads a JSON config file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: TransportConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dead_timeout_secs == 0 {
            return Err(SearchlinkError::Config(
                "dead_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_dead_timeout_secs < self.dead_timeout_secs {
            return Err(SearchlinkError::Config(format!(
                "max_dead_timeout_secs ({}) is smaller than dead_timeout_secs ({})",
                self.max_dead_timeout_secs, self.dead_timeout_secs
            )));
        }
        if self.max_dead_timeout_secs > MAX_DEAD_TIMEOUT_SECS {
            return Err(SearchlinkError::Config(format!(
                "max_dead_timeout_secs ({}) exceeds the limit of {}",
                self.max_dead_timeout_secs, MAX_DEAD_TIMEOUT_SECS
            )));
        }
        if !self.dead_backoff_multiplier.is_finite() || self.dead_backoff_multiplier < 1.0 {
            return Err(SearchlinkError::Config(format!(
                "dead_backoff_multiplier must be >= 1.0, got {}",
                self.dead_backoff_multiplier
            )));
        }
        if self.sniff_after_requests == Some(0) {
            return Err(SearchlinkError::Config(
                "sniff_after_requests must be greater than zero".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(SearchlinkError::Config(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and de-duplicates the seed hosts, preserving their order.
    pub fn node_descriptors(&self) -> Result<Vec<NodeDescriptor>> {
        let mut nodes: Vec<NodeDescriptor> = Vec::with_capacity(self.hosts.len());
        for host in &self.hosts {
            let node = NodeDescriptor::parse(host)?;
            if !nodes.contains(&node) {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    pub fn dead_pool_config(&self) -> DeadPoolConfig {
        DeadPoolConfig {
            base_timeout: Duration::from_secs(self.dead_timeout_secs),
            max_timeout: Duration::from_secs(self.max_dead_timeout_secs),
            backoff_multiplier: self.dead_backoff_multiplier,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
