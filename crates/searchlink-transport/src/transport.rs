use hyper::body::Bytes;
use hyper::Method;
use searchlink_common::{
    JsonSerializer, NodeDescriptor, RequestResult, Result, SearchlinkError, Serializer,
};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::connection::{Connection, ConnectionFactory, HttpConnectionFactory};
use crate::connection_pool::ConnectionPool;
use crate::dead_pool::{BackoffDeadPool, DeadPool};
use crate::observer::{TracingObserver, TransportObserver};
use crate::selector::Selector;
use crate::sniffer::{NodesInfoSniffer, Sniffer};

/// Request dispatcher for a cluster of nodes.
///
/// The transport owns the connection pool and the sniffer. Each call to
/// [`perform_request`](Self::perform_request):
///
/// 1. **Sniffs on start** (once, if configured) before the first request
/// 2. **Selects** a live connection from the pool
/// 3. **Executes** the request outside any lock
/// 4. **Quarantines** the node on a connection-level failure and retries on
///    another node, up to `max_retries + 1` attempts in total
/// 5. **Counts** the request and sniffs once every `sniff_after_requests`
///
/// HTTP errors (the node answered with a non-2xx status) are returned to
/// the caller unchanged after a single attempt.
///
/// A transport is shared by reference (or `Arc`) between concurrent callers.
/// Pool transitions happen under one lock; network I/O never does.
pub struct Transport {
    pool: RwLock<ConnectionPool>,
    factory: Arc<dyn ConnectionFactory>,
    sniffer: Arc<dyn Sniffer>,
    serializer: Arc<dyn Serializer>,
    observer: Arc<dyn TransportObserver>,
    config: TransportConfig,
    requests_since_sniff: AtomicU64,
    start_sniff: OnceCell<()>,
    sniff_lock: Mutex<()>,
}

impl Transport {
    /// Creates a transport with the default HTTP connections, selector,
    /// dead pool, sniffer and observer for `config`.
    ///
    /// # Example
    /// ```no_run
    /// # use searchlink_transport::{Transport, TransportConfig};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use hyper::Method;
    ///
    /// let transport = Transport::new(TransportConfig::with_hosts(["http://127.0.0.1:9200"]))?;
    /// let health = transport
    ///     .perform_request(Method::GET, "/_cluster/health", &[], None)
    ///     .await?;
    /// println!("{}", health.data);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: TransportConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: TransportConfig) -> TransportBuilder {
        TransportBuilder::new(config)
    }

    /// Sends one logical request, retrying on other nodes as needed.
    ///
    /// # Errors
    /// - [`SearchlinkError::Http`] - a node answered with a non-2xx status
    /// - [`SearchlinkError::MaxRetries`] - every attempt failed at the
    ///   connection level; wraps the last failure
    /// - [`SearchlinkError::NoConnectionsAvailable`] - the pool has no members
    /// - [`SearchlinkError::Serialization`] - `body` could not be encoded
    pub async fn perform_request(
        &self,
        method: Method,
        uri: &str,
        params: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<RequestResult> {
        if self.config.sniff_on_start {
            self.start_sniff
                .get_or_init(|| async {
                    self.sniff_quietly().await;
                })
                .await;
        }

        let body = match body {
            Some(value) => Some(Bytes::from(self.serializer.encode(value)?)),
            None => None,
        };

        let result = self.send_with_retries(&method, uri, params, body).await;
        self.count_request().await;
        result
    }

    async fn send_with_retries(
        &self,
        method: &Method,
        uri: &str,
        params: &[(String, String)],
        body: Option<Bytes>,
    ) -> Result<RequestResult> {
        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let connection = self.pool.write().await.get_connection()?;
            let node = connection.node().clone();

            self.observer.request_started(&node, method, uri, attempt);
            let started = Instant::now();

            match connection.execute(method, uri, params, body.clone()).await {
                Ok(result) => {
                    self.observer
                        .request_succeeded(&node, result.status, started.elapsed());
                    self.mark_alive(&node).await;
                    return Ok(result);
                }
                Err(err) if err.is_connection_error() => {
                    self.observer.request_failed(&node, &err, started.elapsed());
                    self.mark_failed(&node).await;

                    if self.config.sniff_on_connection_fail {
                        self.sniff_quietly().await;
                    }

                    if attempt >= max_attempts {
                        warn!(attempts = attempt, %method, uri, "Giving up on request");
                        return Err(SearchlinkError::MaxRetries {
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }
                    debug!(attempt, max_attempts, "Retrying on another node");
                }
                Err(err) => {
                    // The node answered, so it is reachable
                    self.observer.request_failed(&node, &err, started.elapsed());
                    self.mark_alive(&node).await;
                    return Err(err);
                }
            }
        }
    }

    async fn mark_failed(&self, node: &NodeDescriptor) {
        let retry_in = self.pool.write().await.mark_failed(node);
        if let Some(retry_in) = retry_in {
            self.observer.connection_dead(node, retry_in);
        }
    }

    async fn mark_alive(&self, node: &NodeDescriptor) {
        let was_dead = self.pool.write().await.mark_alive(node);
        if was_dead {
            self.observer.connection_revived(node);
        }
    }

    async fn count_request(&self) {
        let Some(threshold) = self.config.sniff_after_requests else {
            self.requests_since_sniff.fetch_add(1, Ordering::SeqCst);
            return;
        };

        // Exactly one caller sees the counter cross the threshold
        let previous = self
            .requests_since_sniff
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(if n + 1 >= threshold { 0 } else { n + 1 })
            });
        if matches!(previous, Ok(n) if n + 1 >= threshold) {
            debug!(threshold, "Request threshold reached, sniffing");
            self.sniff_quietly().await;
        }
    }

    /// Refreshes the pool from the cluster's own view of its members.
    ///
    /// Pool members are asked in turn, live ones first, until one answers.
    /// On success the pool is rebuilt with fresh connections and the request
    /// counter is reset. On failure the pool is left untouched.
    ///
    /// Concurrent calls wait for each other; only one pass runs at a time.
    ///
    /// # Returns
    /// The number of nodes in the rebuilt pool.
    pub async fn sniff(&self) -> Result<usize> {
        let _guard = self.sniff_lock.lock().await;
        self.sniff_locked().await
    }

    /// Sniff for maintenance purposes: failures are logged and dropped, and
    /// the pass is skipped if another one is already running.
    async fn sniff_quietly(&self) {
        let Ok(_guard) = self.sniff_lock.try_lock() else {
            debug!("Sniff already in progress, skipping");
            return;
        };
        if let Err(e) = self.sniff_locked().await {
            warn!("Keeping current nodes: {}", e);
        }
    }

    async fn sniff_locked(&self) -> Result<usize> {
        self.observer.sniff_started();
        let candidates = self.pool.read().await.all_connections();

        let result = self.sniff_from(&candidates).await;
        match &result {
            Ok(nodes) => self.observer.sniff_finished(Ok(nodes)),
            Err(e) => self.observer.sniff_finished(Err(e)),
        }
        let nodes = result?;

        let connections: Vec<Arc<dyn Connection>> =
            nodes.iter().map(|node| self.factory.create(node)).collect();
        let count = {
            let mut pool = self.pool.write().await;
            pool.rebuild(connections);
            pool.len()
        };
        self.requests_since_sniff.store(0, Ordering::SeqCst);

        info!(nodes = count, "Connection pool refreshed from cluster");
        Ok(count)
    }

    async fn sniff_from(&self, candidates: &[Arc<dyn Connection>]) -> Result<Vec<NodeDescriptor>> {
        let mut last_error = None;
        for connection in candidates {
            match self.sniffer.sniff(connection.as_ref()).await {
                Ok(nodes) => return Ok(nodes),
                Err(e) => {
                    debug!(node = %connection.node(), "Sniff attempt failed: {}", e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| SearchlinkError::Sniff("no nodes to sniff from".to_string())))
    }

    /// Nodes currently in rotation
    pub async fn live_nodes(&self) -> Vec<NodeDescriptor> {
        let pool = self.pool.read().await;
        pool.live_connections()
            .iter()
            .map(|c| c.node().clone())
            .collect()
    }

    /// Quarantined nodes, least recently failed first
    pub async fn dead_nodes(&self) -> Vec<NodeDescriptor> {
        let pool = self.pool.read().await;
        pool.dead_connections()
            .iter()
            .map(|c| c.node().clone())
            .collect()
    }

    /// Every pool member, in pool order
    pub async fn nodes(&self) -> Vec<NodeDescriptor> {
        self.pool.read().await.nodes()
    }

    pub fn requests_since_sniff(&self) -> u64 {
        self.requests_since_sniff.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.serializer
    }
}

/// Assembles a [`Transport`], with any component replaced.
///
/// Components left unset fall back to the defaults [`Transport::new`] uses:
/// HTTP connections, the selector named in the config, a
/// [`BackoffDeadPool`], a [`NodesInfoSniffer`], a [`JsonSerializer`] and a
/// [`TracingObserver`].
pub struct TransportBuilder {
    config: TransportConfig,
    selector: Option<Box<dyn Selector>>,
    dead_pool: Option<Box<dyn DeadPool>>,
    sniffer: Option<Arc<dyn Sniffer>>,
    connection_factory: Option<Arc<dyn ConnectionFactory>>,
    serializer: Option<Arc<dyn Serializer>>,
    observer: Option<Arc<dyn TransportObserver>>,
}

impl TransportBuilder {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            selector: None,
            dead_pool: None,
            sniffer: None,
            connection_factory: None,
            serializer: None,
            observer: None,
        }
    }

    pub fn selector(mut self, selector: Box<dyn Selector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn dead_pool(mut self, dead_pool: Box<dyn DeadPool>) -> Self {
        self.dead_pool = Some(dead_pool);
        self
    }

    pub fn sniffer(mut self, sniffer: Arc<dyn Sniffer>) -> Self {
        self.sniffer = Some(sniffer);
        self
    }

    pub fn connection_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.connection_factory = Some(factory);
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn TransportObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validates the config and builds the initial pool from its hosts.
    pub fn build(self) -> Result<Transport> {
        let config = self.config;
        config.validate()?;
        let seeds = config.node_descriptors()?;

        let serializer = self
            .serializer
            .unwrap_or_else(|| Arc::new(JsonSerializer));
        let factory = match self.connection_factory {
            Some(factory) => factory,
            None => Arc::new(HttpConnectionFactory::from_config(&config, serializer.clone())),
        };
        let selector = self.selector.unwrap_or_else(|| config.selector.build());
        let dead_pool = self
            .dead_pool
            .unwrap_or_else(|| Box::new(BackoffDeadPool::new(config.dead_pool_config())));

        let connections = seeds.iter().map(|node| factory.create(node)).collect();
        let pool = ConnectionPool::new(connections, selector, dead_pool, config.randomize_hosts);
        info!(nodes = pool.len(), "Transport initialized");

        Ok(Transport {
            pool: RwLock::new(pool),
            factory,
            sniffer: self
                .sniffer
                .unwrap_or_else(|| Arc::new(NodesInfoSniffer::new())),
            serializer,
            observer: self
                .observer
                .unwrap_or_else(|| Arc::new(TracingObserver)),
            config,
            requests_since_sniff: AtomicU64::new(0),
            start_sniff: OnceCell::new(),
            sniff_lock: Mutex::new(()),
        })
    }
}
