//! Cluster member addressing.

use crate::error::{Result, SearchlinkError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Port assumed when a host string or sniffed address carries none.
pub const DEFAULT_PORT: u16 = 9200;

/// Extra parameter holding a URL prefix that every request path is appended to.
pub const PATH_PARAM: &str = "path";

/// Identifies one cluster member.
///
/// Equality and hashing consider only the host and the effective port, so
/// `es1` and `es1:9200` name the same node while extra parameters
/// (node id, path prefix, ...) ride along without affecting identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl NodeDescriptor {
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
            params: BTreeMap::new(),
        }
    }

    /// Attach an extra connection parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Parses `http://host:port/prefix`, `host:port` or a bare `host`.
    ///
    /// IPv6 literals must be bracketed when a port follows (`[::1]:9200`).
    /// Only plain `http` is accepted as a scheme.
    ///
    /// # Example
    ///
    /// ```
    /// use searchlink_common::NodeDescriptor;
    ///
    /// let node = NodeDescriptor::parse("http://es1.local:9201/search").unwrap();
    /// assert_eq!(node.host, "es1.local");
    /// assert_eq!(node.port, Some(9201));
    /// assert_eq!(node.path_prefix(), "/search");
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(SearchlinkError::InvalidHost("empty host".to_string()));
        }

        let rest = match trimmed.split_once("://") {
            Some((scheme, rest)) => {
                if !scheme.eq_ignore_ascii_case("http") {
                    return Err(SearchlinkError::InvalidHost(format!(
                        "unsupported scheme '{}' in '{}'",
                        scheme, input
                    )));
                }
                rest
            }
            None => trimmed,
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        if authority.contains('@') {
            return Err(SearchlinkError::InvalidHost(format!(
                "credentials are not supported in '{}'",
                input
            )));
        }

        let (host, port) = split_host_port(authority)
            .ok_or_else(|| SearchlinkError::InvalidHost(input.to_string()))?;

        let mut node = NodeDescriptor::new(host.to_ascii_lowercase(), port);
        let path = path.trim_end_matches('/');
        if !path.is_empty() {
            node.params.insert(PATH_PARAM.to_string(), path.to_string());
        }
        Ok(node)
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.effective_port())
        } else {
            format!("{}:{}", self.host, self.effective_port())
        }
    }

    pub fn path_prefix(&self) -> &str {
        self.params.get(PATH_PARAM).map(String::as_str).unwrap_or("")
    }

    /// Base URL every request path is appended to.
    pub fn base_url(&self) -> String {
        format!("http://{}{}", self.address(), self.path_prefix())
    }
}

fn split_host_port(authority: &str) -> Option<(&str, Option<u16>)> {
    if let Some(stripped) = authority.strip_prefix('[') {
        let (host, rest) = stripped.split_once(']')?;
        if host.is_empty() {
            return None;
        }
        return match rest {
            "" => Some((host, None)),
            _ => {
                let port = rest.strip_prefix(':')?.parse().ok()?;
                Some((host, Some(port)))
            }
        };
    }

    // Unbracketed IPv6 literal: no room for a port.
    if authority.matches(':').count() > 1 {
        return Some((authority, None));
    }

    match authority.split_once(':') {
        Some((host, port)) if !host.is_empty() => Some((host, Some(port.parse().ok()?))),
        Some(_) => None,
        None if authority.is_empty() => None,
        None => Some((authority, None)),
    }
}

impl PartialEq for NodeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.effective_port() == other.effective_port()
    }
}

impl Eq for NodeDescriptor {}

impl Hash for NodeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.effective_port().hash(state);
    }
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}
