//! Live/dead membership of the transport's connections.

use rand::seq::SliceRandom;
use searchlink_common::{NodeDescriptor, Result, SearchlinkError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::dead_pool::DeadPool;
use crate::selector::Selector;

/// The set of connections a transport can use.
///
/// Membership is an ordered list of connections; the dead pool decides
/// which of them are quarantined, and the live set is everything else.
/// A connection is therefore always in exactly one of the two sets.
///
/// The pool is a plain `&mut self` state machine. The transport wraps it in
/// a lock and never holds that lock across network I/O.
pub struct ConnectionPool {
    connections: Vec<Arc<dyn Connection>>,
    selector: Box<dyn Selector>,
    dead_pool: Box<dyn DeadPool>,
}

impl ConnectionPool {
    /// Creates a pool. Duplicate nodes are dropped, keeping the first.
    ///
    /// With `randomize` set, the order is shuffled once here so a fleet of
    /// clients does not start on the same node.
    pub fn new(
        connections: Vec<Arc<dyn Connection>>,
        selector: Box<dyn Selector>,
        dead_pool: Box<dyn DeadPool>,
        randomize: bool,
    ) -> Self {
        let mut connections = dedup(connections);
        if randomize {
            connections.shuffle(&mut rand::thread_rng());
        }
        Self {
            connections,
            selector,
            dead_pool,
        }
    }

    /// Picks the connection for the next attempt.
    pub fn get_connection(&mut self) -> Result<Arc<dyn Connection>> {
        self.get_connection_at(Instant::now())
    }

    /// Same as [`get_connection`](Self::get_connection) with an explicit clock.
    ///
    /// 1. Quarantined nodes whose timeout has passed rejoin the live set
    /// 2. If nothing is live but something is dead, the least recently
    ///    failed node is revived early rather than refusing traffic
    /// 3. The selector picks among the live set
    pub fn get_connection_at(&mut self, now: Instant) -> Result<Arc<dyn Connection>> {
        for node in self.dead_pool.revive_eligible(now) {
            debug!(node = %node, "Quarantine expired, node back in rotation");
        }

        let mut live = self.live_connections();
        if live.is_empty() {
            let Some(node) = self.dead_pool.force_revive() else {
                return Err(SearchlinkError::NoConnectionsAvailable);
            };
            warn!(node = %node, "All nodes are quarantined, reviving least recently failed");
            live = self.live_connections();
        }

        self.selector.select(&live)
    }

    /// Takes `node` out of rotation.
    ///
    /// Returns the quarantine duration, or `None` when the node is not a
    /// member (a stale report from before a rebuild).
    pub fn mark_failed(&mut self, node: &NodeDescriptor) -> Option<Duration> {
        self.mark_failed_at(node, Instant::now())
    }

    pub fn mark_failed_at(&mut self, node: &NodeDescriptor, now: Instant) -> Option<Duration> {
        if !self.contains(node) {
            debug!(node = %node, "Ignoring failure for node no longer in the pool");
            return None;
        }
        let timeout = self.dead_pool.mark_dead(node, now);
        Some(timeout)
    }

    /// Clears `node`'s failure history and puts it back in rotation.
    ///
    /// Returns whether the node had failed since its last success.
    pub fn mark_alive(&mut self, node: &NodeDescriptor) -> bool {
        if !self.contains(node) {
            return false;
        }
        self.dead_pool.mark_alive(node)
    }

    /// Replaces the whole membership. All quarantine history is discarded,
    /// including for nodes present both before and after.
    pub fn rebuild(&mut self, connections: Vec<Arc<dyn Connection>>) {
        let connections = dedup(connections);
        info!(
            before = self.connections.len(),
            after = connections.len(),
            "Rebuilding connection pool"
        );
        self.connections = connections;
        self.dead_pool.clear();
    }

    /// Live connections in membership order
    pub fn live_connections(&self) -> Vec<Arc<dyn Connection>> {
        self.connections
            .iter()
            .filter(|c| !self.dead_pool.is_dead(c.node()))
            .cloned()
            .collect()
    }

    /// Quarantined connections, least recently failed first
    pub fn dead_connections(&self) -> Vec<Arc<dyn Connection>> {
        self.dead_pool
            .dead_nodes()
            .iter()
            .filter_map(|node| self.connections.iter().find(|c| c.node() == node).cloned())
            .collect()
    }

    /// Every member, live first
    pub fn all_connections(&self) -> Vec<Arc<dyn Connection>> {
        let mut all = self.live_connections();
        all.extend(self.dead_connections());
        all
    }

    pub fn nodes(&self) -> Vec<NodeDescriptor> {
        self.connections.iter().map(|c| c.node().clone()).collect()
    }

    pub fn contains(&self, node: &NodeDescriptor) -> bool {
        self.connections.iter().any(|c| c.node() == node)
    }

    pub fn is_dead(&self, node: &NodeDescriptor) -> bool {
        self.dead_pool.is_dead(node)
    }

    pub fn failure_count(&self, node: &NodeDescriptor) -> u32 {
        self.dead_pool.failure_count(node)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

fn dedup(connections: Vec<Arc<dyn Connection>>) -> Vec<Arc<dyn Connection>> {
    let mut unique: Vec<Arc<dyn Connection>> = Vec::with_capacity(connections.len());
    for conn in connections {
        if !unique.iter().any(|c| c.node() == conn.node()) {
            unique.push(conn);
        }
    }
    unique
}
