use hyper::Method;
use searchlink_common::Result;
use searchlink_transport::{Transport, TransportConfig};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::operation::{path_segment, Operation};

/// Document-level client over a shared [`Transport`].
///
/// Cloning is cheap; clones share the transport and with it the connection
/// pool. Every method returns the decoded response body.
#[derive(Clone)]
pub struct Client {
    transport: Arc<Transport>,
}

impl Client {
    /// Create a new client with its own transport
    pub fn new(config: TransportConfig) -> Result<Self> {
        Ok(Self::from_transport(Arc::new(Transport::new(config)?)))
    }

    pub fn from_transport(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Stores `document`. With an id the document is created or replaced
    /// (`PUT`); without one the cluster assigns an id (`POST`).
    pub async fn index(
        &self,
        index: &str,
        id: Option<&str>,
        document: &Value,
        params: &[(&str, &str)],
    ) -> Result<Value> {
        let params = Operation::Index.validate_params(params)?;
        let index = path_segment("index", index)?;
        let (method, path) = match id {
            Some(id) => (
                Method::PUT,
                format!("/{}/_doc/{}", index, path_segment("id", id)?),
            ),
            None => (Method::POST, format!("/{}/_doc", index)),
        };
        self.send(method, &path, &params, Some(document)).await
    }

    pub async fn get(&self, index: &str, id: &str, params: &[(&str, &str)]) -> Result<Value> {
        let params = Operation::Get.validate_params(params)?;
        let path = format!(
            "/{}/_doc/{}",
            path_segment("index", index)?,
            path_segment("id", id)?
        );
        self.send(Method::GET, &path, &params, None).await
    }

    /// Partial update; `body` holds `doc`, `script` or `upsert` as the
    /// cluster expects.
    pub async fn update(
        &self,
        index: &str,
        id: &str,
        body: &Value,
        params: &[(&str, &str)],
    ) -> Result<Value> {
        let params = Operation::Update.validate_params(params)?;
        let path = format!(
            "/{}/_update/{}",
            path_segment("index", index)?,
            path_segment("id", id)?
        );
        self.send(Method::POST, &path, &params, Some(body)).await
    }

    pub async fn delete(&self, index: &str, id: &str, params: &[(&str, &str)]) -> Result<Value> {
        let params = Operation::Delete.validate_params(params)?;
        let path = format!(
            "/{}/_doc/{}",
            path_segment("index", index)?,
            path_segment("id", id)?
        );
        self.send(Method::DELETE, &path, &params, None).await
    }

    /// Searches one index, or every index when `index` is `None`.
    ///
    /// A query body is sent with `POST`; without one the request is a plain
    /// `GET`, which suits `q=` lite queries.
    pub async fn search(
        &self,
        index: Option<&str>,
        body: Option<&Value>,
        params: &[(&str, &str)],
    ) -> Result<Value> {
        let params = Operation::Search.validate_params(params)?;
        let path = match index {
            Some(index) => format!("/{}/_search", path_segment("index", index)?),
            None => "/_search".to_string(),
        };
        let method = if body.is_some() { Method::POST } else { Method::GET };
        self.send(method, &path, &params, body).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        debug!(%method, path, "Document request");
        let result = self
            .transport
            .perform_request(method, path, params, body)
            .await?;
        Ok(result.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchlink_common::SearchlinkError;

    fn client() -> Client {
        Client::new(TransportConfig::with_hosts(["http://127.0.0.1:1"])).unwrap()
    }

    #[test]
    fn test_client_is_clonable() {
        let client = client();
        let client2 = client.clone();
        assert!(Arc::ptr_eq(client.transport(), client2.transport()));
    }

    #[tokio::test]
    async fn test_rejects_bad_input_before_sending() {
        let client = client();

        let err = client.get("", "1", &[]).await.unwrap_err();
        assert!(matches!(err, SearchlinkError::InvalidRequest(_)));

        let err = client
            .delete("books", "1", &[("size", "1")])
            .await
            .unwrap_err();
        assert!(matches!(err, SearchlinkError::InvalidParam { .. }));

        // Nothing reached the (unreachable) node
        assert!(client.transport().dead_nodes().await.is_empty());
        assert_eq!(client.transport().requests_since_sniff(), 0);
    }
}
