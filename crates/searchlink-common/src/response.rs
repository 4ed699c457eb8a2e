use crate::node::NodeDescriptor;
use hyper::HeaderMap;
use serde_json::Value;
use std::time::Duration;

/// Raw metadata about the HTTP exchange that produced a [`RequestResult`].
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    /// Node that answered
    pub node: NodeDescriptor,
    /// Full URL the request was sent to
    pub url: String,
    pub headers: HeaderMap,
    /// Wall-clock time of the exchange, body included
    pub took: Duration,
}

/// Successful outcome of a request.
#[derive(Debug, Clone)]
pub struct RequestResult {
    pub status: u16,
    /// Response body decoded by the transport's serializer
    pub data: Value,
    pub meta: ResponseMeta,
}

impl RequestResult {
    pub fn new(status: u16, data: Value, meta: ResponseMeta) -> Self {
        Self { status, data, meta }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.meta.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
