//! Quarantine bookkeeping for failed nodes.

use searchlink_common::NodeDescriptor;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Retry time used when `now + timeout` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Escalating quarantine configuration.
#[derive(Debug, Clone)]
pub struct DeadPoolConfig {
    /// Quarantine after the first failure
    pub base_timeout: Duration,
    /// Maximum timeout cap
    pub max_timeout: Duration,
    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for DeadPoolConfig {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(60),
            max_timeout: Duration::from_secs(3600),
            backoff_multiplier: 2.0,
        }
    }
}

impl DeadPoolConfig {
    /// Calculate timeout with exponential backoff based on consecutive failures
    pub fn calculate_timeout(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_timeout.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_timeout.as_secs_f64() {
            self.max_timeout
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Tracks which nodes are quarantined and when each may be retried.
///
/// The pool calls into this under its own lock; implementations need no
/// synchronisation of their own. Every time-dependent method takes `now`
/// explicitly.
pub trait DeadPool: Send + Sync {
    /// Quarantines `node`, returning how long it stays out of rotation.
    fn mark_dead(&mut self, node: &NodeDescriptor, now: Instant) -> Duration;

    /// Releases every quarantined node whose retry time has passed.
    ///
    /// Released nodes keep their failure history.
    fn revive_eligible(&mut self, now: Instant) -> Vec<NodeDescriptor>;

    /// Releases the node that failed least recently, regardless of timeout.
    fn force_revive(&mut self) -> Option<NodeDescriptor>;

    /// Clears all history for `node`.
    ///
    /// Returns whether there was anything to clear, i.e. the node had
    /// failed since its last success.
    fn mark_alive(&mut self, node: &NodeDescriptor) -> bool;

    fn is_dead(&self, node: &NodeDescriptor) -> bool;

    /// Quarantined nodes, least recently failed first
    fn dead_nodes(&self) -> Vec<NodeDescriptor>;

    fn failure_count(&self, node: &NodeDescriptor) -> u32;

    /// Forgets everything, quarantine and history alike.
    fn clear(&mut self);
}

#[derive(Debug, Clone)]
struct DeadEntry {
    consecutive_failures: u32,
    failed_at: Instant,
    retry_at: Instant,
    quarantined: bool,
}

/// Dead pool with exponential backoff.
///
/// A node's failure count survives revival; only [`DeadPool::mark_alive`]
/// (a successful request) resets it, so a node that keeps failing right
/// after each revival is quarantined for longer and longer.
#[derive(Debug, Default)]
pub struct BackoffDeadPool {
    config: DeadPoolConfig,
    entries: HashMap<NodeDescriptor, DeadEntry>,
}

impl BackoffDeadPool {
    pub fn new(config: DeadPoolConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
        }
    }

    pub fn config(&self) -> &DeadPoolConfig {
        &self.config
    }

    /// When `node` becomes eligible for revival, if quarantined.
    pub fn retry_at(&self, node: &NodeDescriptor) -> Option<Instant> {
        self.entries
            .get(node)
            .filter(|e| e.quarantined)
            .map(|e| e.retry_at)
    }
}

impl DeadPool for BackoffDeadPool {
    fn mark_dead(&mut self, node: &NodeDescriptor, now: Instant) -> Duration {
        let entry = self.entries.entry(node.clone()).or_insert(DeadEntry {
            consecutive_failures: 0,
            failed_at: now,
            retry_at: now,
            quarantined: false,
        });

        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        let timeout = self.config.calculate_timeout(entry.consecutive_failures);
        entry.failed_at = now;
        entry.retry_at = now
            .checked_add(timeout)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        entry.quarantined = true;
        timeout
    }

    fn revive_eligible(&mut self, now: Instant) -> Vec<NodeDescriptor> {
        let mut revived: Vec<(Instant, NodeDescriptor)> = self
            .entries
            .iter_mut()
            .filter(|(_, e)| e.quarantined && e.retry_at <= now)
            .map(|(node, e)| {
                e.quarantined = false;
                (e.failed_at, node.clone())
            })
            .collect();
        revived.sort_by_key(|(failed_at, _)| *failed_at);
        revived.into_iter().map(|(_, node)| node).collect()
    }

    fn force_revive(&mut self) -> Option<NodeDescriptor> {
        let (node, entry) = self
            .entries
            .iter_mut()
            .filter(|(_, e)| e.quarantined)
            .min_by_key(|(_, e)| e.failed_at)?;
        entry.quarantined = false;
        Some(node.clone())
    }

    fn mark_alive(&mut self, node: &NodeDescriptor) -> bool {
        self.entries.remove(node).is_some()
    }

    fn is_dead(&self, node: &NodeDescriptor) -> bool {
        self.entries.get(node).map(|e| e.quarantined).unwrap_or(false)
    }

    fn dead_nodes(&self) -> Vec<NodeDescriptor> {
        let mut dead: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, e)| e.quarantined)
            .collect();
        dead.sort_by_key(|(_, e)| e.failed_at);
        dead.into_iter().map(|(node, _)| node.clone()).collect()
    }

    fn failure_count(&self, node: &NodeDescriptor) -> u32 {
        self.entries
            .get(node)
            .map(|e| e.consecutive_failures)
            .unwrap_or(0)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> NodeDescriptor {
        NodeDescriptor::new(name, None)
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_dead_pool_config_default() {
        let config = DeadPoolConfig::default();
        assert_eq!(config.base_timeout, secs(60));
        assert_eq!(config.max_timeout, secs(3600));
        assert_eq!(config.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_calculate_timeout() {
        let config = DeadPoolConfig {
            base_timeout: secs(30),
            max_timeout: secs(300),
            backoff_multiplier: 2.0,
        };

        assert_eq!(config.calculate_timeout(1), secs(30));
        assert_eq!(config.calculate_timeout(2), secs(60));
        assert_eq!(config.calculate_timeout(3), secs(120));
        assert_eq!(config.calculate_timeout(4), secs(240));
        // Capped at max
        assert_eq!(config.calculate_timeout(5), secs(300));
        assert_eq!(config.calculate_timeout(10), secs(300));
        assert_eq!(config.calculate_timeout(u32::MAX), secs(300));
    }

    #[test]
    fn test_fixed_quarantine_with_unit_multiplier() {
        let config = DeadPoolConfig {
            base_timeout: secs(15),
            max_timeout: secs(300),
            backoff_multiplier: 1.0,
        };
        for failures in 1..10 {
            assert_eq!(config.calculate_timeout(failures), secs(15));
        }
    }

    #[test]
    fn test_mark_dead_sets_future_retry() {
        let mut pool = BackoffDeadPool::default();
        let now = Instant::now();

        let timeout = pool.mark_dead(&node("a"), now);
        assert_eq!(timeout, secs(60));
        assert!(pool.is_dead(&node("a")));
        assert!(pool.retry_at(&node("a")).unwrap() > now);
        assert_eq!(pool.failure_count(&node("a")), 1);
    }

    #[test]
    fn test_repeated_failures_never_shrink_backoff() {
        let mut pool = BackoffDeadPool::new(DeadPoolConfig {
            base_timeout: secs(1),
            max_timeout: secs(20),
            backoff_multiplier: 2.0,
        });
        let mut now = Instant::now();
        let mut previous = Duration::ZERO;

        for _ in 0..12 {
            let timeout = pool.mark_dead(&node("a"), now);
            assert!(timeout >= previous);
            assert!(timeout <= secs(20));
            previous = timeout;
            now += timeout;
            assert_eq!(pool.revive_eligible(now), vec![node("a")]);
        }
        assert_eq!(previous, secs(20));
        assert_eq!(pool.failure_count(&node("a")), 12);
    }

    #[test]
    fn test_revive_only_after_timeout() {
        let mut pool = BackoffDeadPool::default();
        let now = Instant::now();
        pool.mark_dead(&node("a"), now);

        assert!(pool.revive_eligible(now + secs(59)).is_empty());
        assert!(pool.is_dead(&node("a")));

        assert_eq!(pool.revive_eligible(now + secs(60)), vec![node("a")]);
        assert!(!pool.is_dead(&node("a")));
        // History survives revival
        assert_eq!(pool.failure_count(&node("a")), 1);
        assert_eq!(pool.mark_dead(&node("a"), now + secs(61)), secs(120));
    }

    #[test]
    fn test_revive_eligible_orders_by_failure_time() {
        let mut pool = BackoffDeadPool::default();
        let now = Instant::now();
        pool.mark_dead(&node("late"), now + secs(5));
        pool.mark_dead(&node("early"), now);

        let revived = pool.revive_eligible(now + secs(3600));
        assert_eq!(revived, vec![node("early"), node("late")]);
    }

    #[test]
    fn test_force_revive_picks_least_recently_failed() {
        let mut pool = BackoffDeadPool::default();
        let now = Instant::now();
        pool.mark_dead(&node("b"), now + secs(1));
        pool.mark_dead(&node("a"), now);
        pool.mark_dead(&node("c"), now + secs(2));

        assert_eq!(pool.force_revive(), Some(node("a")));
        assert_eq!(pool.force_revive(), Some(node("b")));
        assert_eq!(pool.dead_nodes(), vec![node("c")]);
        assert_eq!(pool.force_revive(), Some(node("c")));
        assert_eq!(pool.force_revive(), None);
    }

    #[test]
    fn test_mark_alive_resets_history() {
        let mut pool = BackoffDeadPool::default();
        let now = Instant::now();
        pool.mark_dead(&node("a"), now);
        pool.mark_dead(&node("a"), now);

        assert!(pool.mark_alive(&node("a")));
        assert!(!pool.is_dead(&node("a")));
        assert_eq!(pool.failure_count(&node("a")), 0);
        assert_eq!(pool.mark_dead(&node("a"), now), secs(60));

        assert!(!pool.mark_alive(&node("never-failed")));
    }

    #[test]
    fn test_huge_timeout_does_not_overflow() {
        let huge = Duration::from_secs(u64::MAX);
        let mut pool = BackoffDeadPool::new(DeadPoolConfig {
            base_timeout: huge,
            max_timeout: huge,
            backoff_multiplier: 2.0,
        });
        let now = Instant::now();

        assert_eq!(pool.mark_dead(&node("a"), now), huge);
        assert_eq!(pool.mark_dead(&node("a"), now), huge);
        assert!(pool.is_dead(&node("a")));
        assert!(pool.revive_eligible(now + secs(7 * 24 * 3600)).is_empty());
        assert!(pool.retry_at(&node("a")).unwrap() > now);
    }

    #[test]
    fn test_clear_forgets_everything() {
        let mut pool = BackoffDeadPool::default();
        let now = Instant::now();
        pool.mark_dead(&node("a"), now);
        pool.clear();
        assert!(pool.dead_nodes().is_empty());
        assert_eq!(pool.failure_count(&node("a")), 0);
    }
}
