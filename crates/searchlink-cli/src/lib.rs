//! # searchlink CLI
//!
//! Helpers behind the `searchlink` binary: turning command-line flags into a
//! [`TransportConfig`] and parsing the small argument formats the
//! subcommands accept.
//!
//! ## Config resolution
//!
//! 1. Start from `--config <file>` if given, otherwise the defaults
//! 2. `-H/--host` replaces the host list when given at least once
//! 3. Every other flag overrides its single field
//!
//! The result is validated before use.

use anyhow::{anyhow, Context, Result};
use hyper::Method;
use searchlink_transport::{SelectorKind, TransportConfig};
use std::path::PathBuf;

/// Transport settings given on the command line
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub config: Option<PathBuf>,
    pub hosts: Vec<String>,
    pub max_retries: Option<usize>,
    pub sniff_on_start: bool,
    pub sniff_on_connection_fail: bool,
    pub sniff_after_requests: Option<u64>,
    pub selector: Option<SelectorKind>,
}

impl ConfigOverrides {
    pub fn resolve(&self) -> Result<TransportConfig> {
        let mut config = match &self.config {
            Some(path) => TransportConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => TransportConfig::default(),
        };

        if !self.hosts.is_empty() {
            config.hosts = self.hosts.clone();
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        // Switches can only turn a setting on
        config.sniff_on_start |= self.sniff_on_start;
        config.sniff_on_connection_fail |= self.sniff_on_connection_fail;
        if self.sniff_after_requests.is_some() {
            config.sniff_after_requests = self.sniff_after_requests;
        }
        if let Some(selector) = self.selector {
            config.selector = selector;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parses `key=value`. The value may itself contain `=`.
pub fn parse_param(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(anyhow!("Invalid parameter '{}': expected key=value", raw)),
    }
}

pub fn parse_method(raw: &str) -> Result<Method> {
    let upper = raw.to_ascii_uppercase();
    match upper.as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        "HEAD" => Ok(Method::HEAD),
        _ => Err(anyhow!("Unsupported HTTP method '{}'", raw)),
    }
}

/// Parses an optional JSON argument, naming the flag in the error.
pub fn parse_json(raw: Option<&str>, what: &str) -> Result<Option<serde_json::Value>> {
    raw.map(|raw| {
        serde_json::from_str(raw).map_err(|e| anyhow!("Invalid JSON in {}: {}", what, e))
    })
    .transpose()
}
