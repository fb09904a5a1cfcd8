//! Transport trait for abstracting the HTTP layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// HTTP method of an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// A request about to leave the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRequest {
    /// HTTP method
    pub method: Method,
    /// Endpoint path relative to the backend base URL
    pub endpoint: String,
    /// JSON body, if any
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

impl OutboundRequest {
    /// Create a request without a body.
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            body: None,
        }
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// The backend's answer to an [`OutboundRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed JSON body
    #[serde(default)]
    pub body: serde_json::Value,
}

impl TransportResponse {
    /// Whether the status code is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for the layer that actually puts requests on the wire.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for the backend's response.
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let request = OutboundRequest::new(Method::Post, "game/v2/session")
            .with_body(json!({ "game_key": "dev_123" }));

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.endpoint, "game/v2/session");
        assert_eq!(request.body, Some(json!({ "game_key": "dev_123" })));
    }

    #[test]
    fn test_method_serializes_uppercase() {
        let request = OutboundRequest::new(Method::Get, "player/info");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["method"], "GET");
        assert_eq!(value["body"], serde_json::Value::Null);
    }

    #[test]
    fn test_response_success_range() {
        let ok = TransportResponse {
            status: 204,
            body: serde_json::Value::Null,
        };
        let too_many = TransportResponse {
            status: 429,
            body: json!({ "message": "slow down" }),
        };
        assert!(ok.is_success());
        assert!(!too_many.is_success());
    }
}
