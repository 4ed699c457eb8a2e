//! Hooks for watching what the transport does.

use hyper::Method;
use searchlink_common::{NodeDescriptor, SearchlinkError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Receives transport lifecycle events.
///
/// Every method has an empty default body, so an implementation only needs
/// to override the events it cares about. Callbacks run inline on the
/// request path and must not block.
///
/// # Example
///
/// ```rust
/// use searchlink_common::NodeDescriptor;
/// use searchlink_transport::TransportObserver;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct DeadCounter(AtomicUsize);
///
/// impl TransportObserver for DeadCounter {
///     fn connection_dead(&self, _node: &NodeDescriptor, _retry_in: std::time::Duration) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait TransportObserver: Send + Sync {
    /// An attempt is about to be sent. `attempt` starts at 1.
    fn request_started(&self, _node: &NodeDescriptor, _method: &Method, _uri: &str, _attempt: usize) {}

    /// A node answered with a 2xx status.
    fn request_succeeded(&self, _node: &NodeDescriptor, _status: u16, _took: Duration) {}

    /// An attempt failed, either at the connection level or with an HTTP error.
    fn request_failed(&self, _node: &NodeDescriptor, _error: &SearchlinkError, _took: Duration) {}

    /// A node was quarantined for `retry_in`.
    fn connection_dead(&self, _node: &NodeDescriptor, _retry_in: Duration) {}

    /// A quarantined node answered again and rejoined the live set.
    fn connection_revived(&self, _node: &NodeDescriptor) {}

    fn sniff_started(&self) {}

    fn sniff_finished(&self, _result: Result<&[NodeDescriptor], &SearchlinkError>) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TransportObserver for NoopObserver {}

/// Observer that emits `tracing` events. The default for a new transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TransportObserver for TracingObserver {
    fn request_started(&self, node: &NodeDescriptor, method: &Method, uri: &str, attempt: usize) {
        debug!(node = %node, %method, uri, attempt, "Sending request");
    }

    fn request_succeeded(&self, node: &NodeDescriptor, status: u16, took: Duration) {
        debug!(node = %node, status, took_ms = took.as_millis() as u64, "Request succeeded");
    }

    fn request_failed(&self, node: &NodeDescriptor, error: &SearchlinkError, took: Duration) {
        if error.is_connection_error() {
            warn!(node = %node, took_ms = took.as_millis() as u64, "Request failed: {}", error);
        } else {
            debug!(node = %node, took_ms = took.as_millis() as u64, "Request returned error: {}", error);
        }
    }

    fn connection_dead(&self, node: &NodeDescriptor, retry_in: Duration) {
        warn!(node = %node, retry_in_secs = retry_in.as_secs_f64(), "Marking node dead");
    }

    fn connection_revived(&self, node: &NodeDescriptor) {
        info!(node = %node, "Node is alive again");
    }

    fn sniff_started(&self) {
        debug!("Sniffing cluster nodes");
    }

    fn sniff_finished(&self, result: Result<&[NodeDescriptor], &SearchlinkError>) {
        match result {
            Ok(nodes) => info!(nodes = nodes.len(), "Sniff complete"),
            Err(e) => warn!("Sniff failed: {}", e),
        }
    }
}
