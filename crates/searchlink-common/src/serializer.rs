//! Body encoding.
//!
//! The transport never looks inside documents; it hands them to a
//! [`Serializer`] on the way out and decodes response bodies with the same
//! serializer on the way back.

use crate::error::Result;
use serde_json::Value;

pub trait Serializer: Send + Sync {
    /// Encode a document into a request body
    fn encode(&self, document: &Value) -> Result<Vec<u8>>;

    /// Decode a response body.
    ///
    /// `content_type` is the response's `Content-Type` header, if any.
    fn decode(&self, data: &[u8], content_type: Option<&str>) -> Result<Value>;

    /// `Content-Type` sent with encoded bodies
    fn content_type(&self) -> &'static str;
}

/// JSON serializer.
///
/// Decoding is lenient about what the node sends back:
/// - empty bodies (e.g. `HEAD` responses) decode to `null`
/// - JSON content (or no declared content type) is parsed
/// - anything else, like `text/plain` from `_cat` endpoints, becomes a string
///
/// # Example
///
/// ```
/// use searchlink_common::{JsonSerializer, Serializer};
/// use serde_json::json;
///
/// let serializer = JsonSerializer;
/// let bytes = serializer.encode(&json!({"title": "hello"})).unwrap();
/// let value = serializer.decode(&bytes, Some("application/json")).unwrap();
/// assert_eq!(value["title"], "hello");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn encode(&self, document: &Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(document)?)
    }

    fn decode(&self, data: &[u8], content_type: Option<&str>) -> Result<Value> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        let is_json = content_type
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(true);

        if is_json {
            Ok(serde_json::from_slice(data)?)
        } else {
            Ok(Value::String(String::from_utf8_lossy(data).into_owned()))
        }
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}
