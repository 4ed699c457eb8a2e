//! One addressable node and the means to talk HTTP to it.

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use searchlink_common::{
    NodeDescriptor, RequestResult, ResponseMeta, Result, SearchlinkError, Serializer,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::TransportConfig;

/// A connection to exactly one node.
///
/// `execute` must fail with a connection-level error
/// ([`SearchlinkError::is_connection_error`]) when the node cannot be
/// reached, and with [`SearchlinkError::Http`] when the node answered with a
/// non-success status. Only the former takes the node out of rotation.
#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    fn node(&self) -> &NodeDescriptor;

    async fn execute(
        &self,
        method: &Method,
        path: &str,
        params: &[(String, String)],
        body: Option<Bytes>,
    ) -> Result<RequestResult>;
}

/// Builds connections when the pool is created or rebuilt after a sniff.
pub trait ConnectionFactory: Send + Sync {
    fn create(&self, node: &NodeDescriptor) -> Arc<dyn Connection>;
}

type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// HTTP/1 connection backed by a hyper client shared with every other
/// connection built by the same [`HttpConnectionFactory`].
#[derive(Clone)]
pub struct HttpConnection {
    node: NodeDescriptor,
    base_url: String,
    client: HttpClient,
    serializer: Arc<dyn Serializer>,
    request_timeout: Duration,
}

impl HttpConnection {
    /// Full URL for `path` on this node, query string included.
    pub fn url_for(&self, path: &str, params: &[(String, String)]) -> String {
        let mut url = self.base_url.clone();
        if !path.starts_with('/') {
            url.push('/');
        }
        url.push_str(path);

        if !params.is_empty() {
            let query = params
                .iter()
                .map(|(key, value)| {
                    format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
                })
                .collect::<Vec<_>>()
                .join("&");
            url.push(if path.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }
        url
    }

    fn connection_error(&self, err: impl fmt::Display) -> SearchlinkError {
        SearchlinkError::Connection {
            node: self.node.to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl Connection for HttpConnection {
    fn node(&self) -> &NodeDescriptor {
        &self.node
    }

    async fn execute(
        &self,
        method: &Method,
        path: &str,
        params: &[(String, String)],
        body: Option<Bytes>,
    ) -> Result<RequestResult> {
        let url = self.url_for(path, params);

        let mut builder = Request::builder().method(method.clone()).uri(&url);
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, self.serializer.content_type());
        }
        let request = builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|e| SearchlinkError::InvalidRequest(format!("{}: {}", url, e)))?;

        let started = Instant::now();

        // Timeout covers the whole exchange, body included
        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| self.connection_error(e))?;
            let (parts, body) = response.into_parts();
            let bytes = body
                .collect()
                .await
                .map_err(|e| self.connection_error(e))?
                .to_bytes();
            Ok::<_, SearchlinkError>((parts, bytes))
        };

        let (parts, bytes) = tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| SearchlinkError::Timeout {
                node: self.node.to_string(),
                timeout_ms: self.request_timeout.as_millis() as u64,
            })??;

        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());

        if !parts.status.is_success() {
            // Error bodies are informational; keep whatever the node sent
            let body = self
                .serializer
                .decode(&bytes, content_type)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
            return Err(SearchlinkError::Http {
                status: parts.status.as_u16(),
                body,
            });
        }

        let data = self.serializer.decode(&bytes, content_type)?;

        Ok(RequestResult::new(
            parts.status.as_u16(),
            data,
            ResponseMeta {
                node: self.node.clone(),
                url,
                headers: parts.headers,
                took: started.elapsed(),
            },
        ))
    }
}

impl fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection")
            .field("node", &self.node)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Owns the hyper client shared by all [`HttpConnection`]s it creates.
///
/// The client (and its keep-alive pool) lives as long as the factory and
/// any connection built from it.
pub struct HttpConnectionFactory {
    client: HttpClient,
    serializer: Arc<dyn Serializer>,
    request_timeout: Duration,
}

impl HttpConnectionFactory {
    pub fn new(
        connect_timeout: Duration,
        request_timeout: Duration,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            serializer,
            request_timeout,
        }
    }

    pub fn from_config(config: &TransportConfig, serializer: Arc<dyn Serializer>) -> Self {
        Self::new(config.connect_timeout(), config.request_timeout(), serializer)
    }

    pub fn create_http(&self, node: &NodeDescriptor) -> HttpConnection {
        HttpConnection {
            node: node.clone(),
            base_url: node.base_url(),
            client: self.client.clone(),
            serializer: self.serializer.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

impl ConnectionFactory for HttpConnectionFactory {
    fn create(&self, node: &NodeDescriptor) -> Arc<dyn Connection> {
        Arc::new(self.create_http(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchlink_common::JsonSerializer;
    use tokio::net::TcpListener;

    fn factory(request_timeout: Duration) -> HttpConnectionFactory {
        HttpConnectionFactory::new(
            Duration::from_millis(500),
            request_timeout,
            Arc::new(JsonSerializer),
        )
    }

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_url_for_plain_path() {
        let conn = factory(Duration::from_secs(1)).create_http(&NodeDescriptor::new("es1", None));
        assert_eq!(conn.url_for("/_cluster/health", &[]), "http://es1:9200/_cluster/health");
        assert_eq!(conn.url_for("_cat/nodes", &[]), "http://es1:9200/_cat/nodes");
    }

    #[test]
    fn test_url_for_encodes_params() {
        let conn = factory(Duration::from_secs(1)).create_http(&NodeDescriptor::new("es1", Some(9201)));
        let url = conn.url_for("/logs/_search", &params(&[("q", "level:error AND app"), ("size", "10")]));
        assert_eq!(
            url,
            "http://es1:9201/logs/_search?q=level%3Aerror%20AND%20app&size=10"
        );
    }

    #[test]
    fn test_url_for_respects_path_prefix() {
        let node = NodeDescriptor::parse("http://proxy:8080/es").unwrap();
        let conn = factory(Duration::from_secs(1)).create_http(&node);
        assert_eq!(conn.url_for("/_nodes", &[]), "http://proxy:8080/es/_nodes");
    }

    #[tokio::test]
    async fn test_refused_connection_is_connection_error() {
        // Grab a free port, then close it so nothing listens there
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let conn = factory(Duration::from_secs(2))
            .create(&NodeDescriptor::new("127.0.0.1", Some(port)));
        let err = conn.execute(&Method::GET, "/", &[], None).await.unwrap_err();
        assert!(err.is_connection_error(), "unexpected error: {:?}", err);
    }

    #[tokio::test]
    async fn test_silent_node_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Accept and hold the socket without ever answering
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let conn = factory(Duration::from_millis(100))
            .create(&NodeDescriptor::new("127.0.0.1", Some(port)));
        let err = conn.execute(&Method::GET, "/", &[], None).await.unwrap_err();
        assert!(matches!(err, SearchlinkError::Timeout { timeout_ms: 100, .. }));
        assert!(err.is_connection_error());
    }
}
