//! Request transport for a cluster of HTTP search nodes.
//!
//! [`Transport`] picks a live node, sends the request, quarantines nodes
//! that cannot be reached and retries elsewhere. It can refresh its view of
//! the cluster by sniffing the nodes info API.

pub mod config;
pub mod connection;
pub mod connection_pool;
pub mod dead_pool;
pub mod observer;
pub mod selector;
pub mod sniffer;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::TransportConfig;
pub use connection::{Connection, ConnectionFactory, HttpConnection, HttpConnectionFactory};
pub use connection_pool::ConnectionPool;
pub use dead_pool::{BackoffDeadPool, DeadPool, DeadPoolConfig};
pub use observer::{NoopObserver, TracingObserver, TransportObserver};
pub use selector::{
    RandomSelector, RoundRobinSelector, Selector, SelectorKind, StickyRoundRobinSelector,
};
pub use sniffer::{NodesInfoSniffer, Sniffer};
pub use transport::{Transport, TransportBuilder};
