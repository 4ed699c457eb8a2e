//! Strategies for choosing which live connection serves the next request.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use searchlink_common::{NodeDescriptor, Result, SearchlinkError};
use serde::Deserialize;
use std::sync::Arc;

use crate::connection::Connection;

/// Picks one connection out of the live set.
///
/// Selectors are owned by the pool and only ever called under the pool's
/// lock, so they can keep plain mutable state.
pub trait Selector: Send + Sync {
    /// Fails with [`SearchlinkError::NoConnectionsAvailable`] on an empty set.
    fn select(&mut self, connections: &[Arc<dyn Connection>]) -> Result<Arc<dyn Connection>>;
}

/// Built-in selectors, for configuration files and CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    RoundRobin,
    StickyRoundRobin,
    Random,
}

impl SelectorKind {
    pub fn build(self) -> Box<dyn Selector> {
        match self {
            SelectorKind::RoundRobin => Box::new(RoundRobinSelector::new()),
            SelectorKind::StickyRoundRobin => Box::new(StickyRoundRobinSelector::new()),
            SelectorKind::Random => Box::new(RandomSelector::new()),
        }
    }
}

impl std::str::FromStr for SelectorKind {
    type Err = SearchlinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "round_robin" | "round-robin" => Ok(SelectorKind::RoundRobin),
            "sticky_round_robin" | "sticky-round-robin" | "sticky" => {
                Ok(SelectorKind::StickyRoundRobin)
            }
            "random" => Ok(SelectorKind::Random),
            other => Err(SearchlinkError::Config(format!("unknown selector '{}'", other))),
        }
    }
}

/// Round-robin over the live set.
///
/// The cursor is taken modulo the current length on every call, so the live
/// set may shrink or grow between calls without the selector ever going out
/// of bounds.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    cursor: usize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for RoundRobinSelector {
    fn select(&mut self, connections: &[Arc<dyn Connection>]) -> Result<Arc<dyn Connection>> {
        if connections.is_empty() {
            return Err(SearchlinkError::NoConnectionsAvailable);
        }

        let idx = self.cursor % connections.len();
        self.cursor = (idx + 1) % connections.len();
        Ok(connections[idx].clone())
    }
}

/// Sticks to one node until it leaves the live set, then moves on
/// round-robin.
#[derive(Debug, Default)]
pub struct StickyRoundRobinSelector {
    current: Option<NodeDescriptor>,
    fallback: RoundRobinSelector,
}

impl StickyRoundRobinSelector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for StickyRoundRobinSelector {
    fn select(&mut self, connections: &[Arc<dyn Connection>]) -> Result<Arc<dyn Connection>> {
        if let Some(current) = &self.current {
            if let Some(conn) = connections.iter().find(|c| c.node() == current) {
                return Ok(conn.clone());
            }
        }

        let next = self.fallback.select(connections)?;
        self.current = Some(next.node().clone());
        Ok(next)
    }
}

/// Uniformly random choice. Seed it for reproducible runs.
#[derive(Debug)]
pub struct RandomSelector {
    rng: StdRng,
}

impl RandomSelector {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl Selector for RandomSelector {
    fn select(&mut self, connections: &[Arc<dyn Connection>]) -> Result<Arc<dyn Connection>> {
        if connections.is_empty() {
            return Err(SearchlinkError::NoConnectionsAvailable);
        }
        let idx = self.rng.gen_range(0..connections.len());
        Ok(connections[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubConnection;

    fn conns(names: &[&str]) -> Vec<Arc<dyn Connection>> {
        names
            .iter()
            .map(|n| StubConnection::shared(NodeDescriptor::new(*n, None)))
            .collect()
    }

    fn hosts(picked: &[Arc<dyn Connection>]) -> Vec<String> {
        picked.iter().map(|c| c.node().host.clone()).collect()
    }

    #[test]
    fn test_round_robin() {
        let live = conns(&["node1", "node2", "node3"]);
        let mut selector = RoundRobinSelector::new();

        let picked: Vec<_> = (0..4).map(|_| selector.select(&live).unwrap()).collect();
        assert_eq!(hosts(&picked), vec!["node1", "node2", "node3", "node1"]);
    }

    #[test]
    fn test_round_robin_visits_each_once_per_cycle() {
        let live = conns(&["a", "b", "c", "d", "e"]);
        let mut selector = RoundRobinSelector::new();
        // Start mid-cycle
        selector.select(&live).unwrap();
        selector.select(&live).unwrap();

        let mut seen: Vec<String> = (0..live.len())
            .map(|_| selector.select(&live).unwrap().node().host.clone())
            .collect();
        assert_eq!(seen, vec!["c", "d", "e", "a", "b"]);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), live.len());
    }

    #[test]
    fn test_round_robin_wraps_when_set_shrinks() {
        let mut selector = RoundRobinSelector::new();
        let five = conns(&["a", "b", "c", "d", "e"]);
        for _ in 0..4 {
            selector.select(&five).unwrap();
        }

        let two = conns(&["a", "b"]);
        // Cursor was 4: 4 % 2 == 0
        assert_eq!(selector.select(&two).unwrap().node().host, "a");
        assert_eq!(selector.select(&two).unwrap().node().host, "b");
    }

    #[test]
    fn test_empty_set_returns_no_connections() {
        let mut rr = RoundRobinSelector::new();
        let mut sticky = StickyRoundRobinSelector::new();
        let mut random = RandomSelector::with_seed(7);
        assert!(matches!(rr.select(&[]), Err(SearchlinkError::NoConnectionsAvailable)));
        assert!(matches!(sticky.select(&[]), Err(SearchlinkError::NoConnectionsAvailable)));
        assert!(matches!(random.select(&[]), Err(SearchlinkError::NoConnectionsAvailable)));
    }

    #[test]
    fn test_sticky_keeps_node_until_it_leaves() {
        let live = conns(&["a", "b", "c"]);
        let mut selector = StickyRoundRobinSelector::new();

        for _ in 0..5 {
            assert_eq!(selector.select(&live).unwrap().node().host, "a");
        }

        let without_a = conns(&["b", "c"]);
        let next = selector.select(&without_a).unwrap().node().host.clone();
        assert_ne!(next, "a");
        for _ in 0..3 {
            assert_eq!(selector.select(&without_a).unwrap().node().host, next);
        }
    }

    #[test]
    fn test_random_is_reproducible_with_seed() {
        let live = conns(&["a", "b", "c", "d"]);
        let mut first = RandomSelector::with_seed(42);
        let mut second = RandomSelector::with_seed(42);

        let a: Vec<_> = (0..20).map(|_| first.select(&live).unwrap().node().host.clone()).collect();
        let b: Vec<_> = (0..20).map(|_| second.select(&live).unwrap().node().host.clone()).collect();
        assert_eq!(a, b);
        assert!(a.iter().all(|h| ["a", "b", "c", "d"].contains(&h.as_str())));
    }

    #[test]
    fn test_selector_kind_parsing() {
        assert_eq!("round_robin".parse::<SelectorKind>().unwrap(), SelectorKind::RoundRobin);
        assert_eq!("sticky".parse::<SelectorKind>().unwrap(), SelectorKind::StickyRoundRobin);
        assert_eq!("random".parse::<SelectorKind>().unwrap(), SelectorKind::Random);
        assert!("weighted".parse::<SelectorKind>().is_err());
    }
}
