//! Scripted connections for unit tests.

use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::{HeaderMap, Method};
use searchlink_common::{NodeDescriptor, RequestResult, ResponseMeta, Result, SearchlinkError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::connection::{Connection, ConnectionFactory};

#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    /// 200 with `{"node": "<host>"}`
    Ok,
    /// 200 with the given body
    Respond(Value),
    Refused,
    Http(u16),
}

#[derive(Debug)]
pub(crate) struct StubConnection {
    node: NodeDescriptor,
    outcome: Mutex<Outcome>,
    calls: AtomicUsize,
}

impl StubConnection {
    pub(crate) fn new(node: NodeDescriptor, outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            node,
            outcome: Mutex::new(outcome),
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn shared(node: NodeDescriptor) -> Arc<dyn Connection> {
        Self::new(node, Outcome::Ok)
    }

    pub(crate) fn set_outcome(&self, outcome: Outcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for StubConnection {
    fn node(&self) -> &NodeDescriptor {
        &self.node
    }

    async fn execute(
        &self,
        _method: &Method,
        path: &str,
        _params: &[(String, String)],
        _body: Option<Bytes>,
    ) -> Result<RequestResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.outcome.lock().unwrap().clone();
        match outcome {
            Outcome::Ok => Ok(self.result(json!({"node": self.node.host}), path)),
            Outcome::Respond(body) => Ok(self.result(body, path)),
            Outcome::Refused => Err(SearchlinkError::Connection {
                node: self.node.to_string(),
                reason: "connection refused".to_string(),
            }),
            Outcome::Http(status) => Err(SearchlinkError::Http {
                status,
                body: json!({"error": "scripted"}),
            }),
        }
    }
}

impl StubConnection {
    fn result(&self, data: Value, path: &str) -> RequestResult {
        RequestResult::new(
            200,
            data,
            ResponseMeta {
                node: self.node.clone(),
                url: format!("{}{}", self.node.base_url(), path),
                headers: HeaderMap::new(),
                took: Duration::from_millis(1),
            },
        )
    }
}

/// Hands out stub connections and remembers them by host so tests can
/// script nodes that only come into existence after a sniff.
#[derive(Default)]
pub(crate) struct StubFactory {
    created: Mutex<Vec<Arc<StubConnection>>>,
    outcomes: Mutex<Vec<(String, Outcome)>>,
}

impl StubFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Outcome for connections to `host` created from now on.
    pub(crate) fn script(&self, host: &str, outcome: Outcome) {
        self.outcomes.lock().unwrap().push((host.to_string(), outcome));
    }

    /// Most recently created connection for `host`.
    pub(crate) fn get(&self, host: &str) -> Arc<StubConnection> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.node.host == host)
            .cloned()
            .unwrap_or_else(|| panic!("no connection created for {}", host))
    }

    pub(crate) fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

impl ConnectionFactory for StubFactory {
    fn create(&self, node: &NodeDescriptor) -> Arc<dyn Connection> {
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(host, _)| *host == node.host)
            .map(|(_, o)| o.clone())
            .unwrap_or(Outcome::Ok);
        let conn = StubConnection::new(node.clone(), outcome);
        self.created.lock().unwrap().push(conn.clone());
        conn
    }
}
