//! Cluster topology discovery.

use async_trait::async_trait;
use hyper::Method;
use searchlink_common::{NodeDescriptor, Result, SearchlinkError};
use serde_json::Value;
use tracing::debug;

use crate::connection::Connection;

/// Param key holding the node id reported by the cluster.
pub const NODE_ID_PARAM: &str = "id";
/// Param key holding the node name reported by the cluster.
pub const NODE_NAME_PARAM: &str = "name";

/// Asks one node for the cluster's current membership.
///
/// Any failure, network or parse, is reported as
/// [`SearchlinkError::Sniff`]. The transport decides what to do with it.
#[async_trait]
pub trait Sniffer: Send + Sync {
    async fn sniff(&self, connection: &dyn Connection) -> Result<Vec<NodeDescriptor>>;
}

/// Reads the nodes info API.
#[derive(Debug, Clone)]
pub struct NodesInfoSniffer {
    path: String,
}

impl NodesInfoSniffer {
    pub const DEFAULT_PATH: &'static str = "/_nodes/_all/http";

    pub fn new() -> Self {
        Self::with_path(Self::DEFAULT_PATH)
    }

    pub fn with_path(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Default for NodesInfoSniffer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sniffer for NodesInfoSniffer {
    async fn sniff(&self, connection: &dyn Connection) -> Result<Vec<NodeDescriptor>> {
        let response = connection
            .execute(&Method::GET, &self.path, &[], None)
            .await
            .map_err(|e| {
                SearchlinkError::Sniff(format!("{} did not answer: {}", connection.node(), e))
            })?;

        let nodes = parse_nodes(&response.data)?;
        debug!(
            via = %connection.node(),
            nodes = nodes.len(),
            "Parsed cluster topology"
        );
        Ok(nodes)
    }
}

/// Extracts node descriptors from a nodes info response body.
///
/// Nodes without a usable HTTP address (HTTP disabled, client-only nodes
/// behind a proxy, or an address we cannot parse) are skipped. An empty result is an error so a sniff can
/// never leave the pool without members.
pub fn parse_nodes(body: &Value) -> Result<Vec<NodeDescriptor>> {
    let nodes = body
        .get("nodes")
        .and_then(Value::as_object)
        .ok_or_else(|| SearchlinkError::Sniff("response has no 'nodes' object".to_string()))?;

    let mut found: Vec<NodeDescriptor> = Vec::with_capacity(nodes.len());
    for (id, info) in nodes {
        let address = info
            .pointer("/http/publish_address")
            .or_else(|| info.get("http_address"))
            .and_then(Value::as_str);

        let Some(address) = address else {
            debug!(node_id = %id, "Skipping node without an HTTP address");
            continue;
        };

        let mut node = match parse_publish_address(address) {
            Ok(node) => node.with_param(NODE_ID_PARAM, id.as_str()),
            Err(e) => {
                debug!(node_id = %id, address, "Skipping node with unparseable HTTP address: {}", e);
                continue;
            }
        };
        if let Some(name) = info.get("name").and_then(Value::as_str) {
            node = node.with_param(NODE_NAME_PARAM, name);
        }

        if !found.contains(&node) {
            found.push(node);
        }
    }

    if found.is_empty() {
        return Err(SearchlinkError::Sniff(
            "no nodes with an HTTP address in response".to_string(),
        ));
    }
    Ok(found)
}

/// Parses a publish address as the cluster reports it.
///
/// Accepted shapes: `ip:port`, `hostname/ip:port` (the ip is used),
/// `inet[/ip:port]` and `[v6]:port`.
pub fn parse_publish_address(address: &str) -> Result<NodeDescriptor> {
    let mut addr = address.trim();
    if let Some(inner) = addr.strip_prefix("inet[").and_then(|a| a.strip_suffix(']')) {
        addr = inner;
    }
    if let Some((_, ip)) = addr.rsplit_once('/') {
        addr = ip;
    }

    if addr.is_empty() || addr.contains("://") {
        return Err(SearchlinkError::Sniff(format!(
            "unrecognized publish address '{}'",
            address
        )));
    }

    NodeDescriptor::parse(addr).map_err(|e| {
        SearchlinkError::Sniff(format!("bad publish address '{}': {}", address, e))
    })
}
