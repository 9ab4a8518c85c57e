// Connector gateway abstraction for external data sources

//! # Connector Gateway
//!
//! Credit bureaus, income verification services and similar providers are
//! reached only through a [`ConnectorGateway`]. The engine needs nothing from
//! a gateway except "give me the response for this connector and these
//! parameters, or fail". Cross-invocation caching and retries are the
//! gateway's own business.
//!
//! ## Implementations
//!
//! - [`StaticConnectorGateway`]: canned responses held in memory, used by
//!   tests and by offline CLI runs with a fixtures file
//! - [`HttpConnectorGateway`](super::http_gateway::HttpConnectorGateway):
//!   calls configured HTTP endpoints with caching and retry
//!
//! ## Rust Learning Notes:
//!
//! ### Async Traits
//! The `async-trait` crate provides a macro to enable async trait methods
//! that can be called through `Arc<dyn ConnectorGateway>`.
//!
//! ### Trait Bounds
//! `Send + Sync` let one gateway be shared by many concurrent executions.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::{Result, UnderwriterError};

/// Resolves named external data sources
#[async_trait]
pub trait ConnectorGateway: Send + Sync {
    /// Fetch the response of `connector_id` for already-resolved `params`
    ///
    /// `cache_enabled` is a hint: implementations with a cross-invocation
    /// cache may serve or store the response when it is `true`.
    async fn call(
        &self,
        connector_id: &str,
        params: &Map<String, Value>,
        cache_enabled: bool,
    ) -> Result<Value>;
}

/// A call received by a [`StaticConnectorGateway`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub connector_id: String,
    pub params: Map<String, Value>,
    pub cache_enabled: bool,
}

/// In-memory gateway serving fixed responses per connector id
#[derive(Debug, Default)]
pub struct StaticConnectorGateway {
    responses: RwLock<HashMap<String, Value>>,
    failures: RwLock<HashMap<String, String>>,
    calls: RwLock<Vec<RecordedCall>>,
    call_count: AtomicUsize,
}

impl StaticConnectorGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a gateway from a `{connectorId: response}` fixtures object
    pub fn from_fixtures(fixtures: &Value) -> Result<Self> {
        let map = fixtures.as_object().ok_or_else(|| {
            UnderwriterError::InvalidInput("connector fixtures must be a JSON object".to_string())
        })?;

        Ok(map
            .iter()
            .fold(Self::new(), |gateway, (id, response)| {
                gateway.with_response(id.clone(), response.clone())
            }))
    }

    /// Serve `response` for every call to `connector_id`
    pub fn with_response(mut self, connector_id: impl Into<String>, response: Value) -> Self {
        self.responses
            .get_mut()
            .insert(connector_id.into(), response);
        self
    }

    /// Fail every call to `connector_id` with `message`
    pub fn with_failure(mut self, connector_id: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures
            .get_mut()
            .insert(connector_id.into(), message.into());
        self
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every call received so far, in order
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl ConnectorGateway for StaticConnectorGateway {
    async fn call(
        &self,
        connector_id: &str,
        params: &Map<String, Value>,
        cache_enabled: bool,
    ) -> Result<Value> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.write().await.push(RecordedCall {
            connector_id: connector_id.to_string(),
            params: params.clone(),
            cache_enabled,
        });

        if let Some(message) = self.failures.read().await.get(connector_id) {
            return Err(UnderwriterError::Connector {
                connector_id: connector_id.to_string(),
                message: message.clone(),
            });
        }

        self.responses
            .read()
            .await
            .get(connector_id)
            .cloned()
            .ok_or_else(|| UnderwriterError::Connector {
                connector_id: connector_id.to_string(),
                message: "connector not configured".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_gateway_serves_and_records() {
        let gateway = StaticConnectorGateway::new().with_response("bureau", json!({"score": 700}));
        let mut params = Map::new();
        params.insert("ssn".to_string(), json!("123"));

        let response = gateway.call("bureau", &params, true).await.unwrap();

        assert_eq!(response, json!({"score": 700}));
        assert_eq!(gateway.call_count(), 1);
        assert_eq!(gateway.calls().await[0].params, params);
    }

    #[tokio::test]
    async fn test_static_gateway_failures() {
        let gateway = StaticConnectorGateway::new().with_failure("bureau", "timeout");

        let err = gateway.call("bureau", &Map::new(), false).await.unwrap_err();
        assert_eq!(err.to_string(), "Connector 'bureau' failed: timeout");

        let err = gateway.call("unknown", &Map::new(), false).await.unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn test_from_fixtures() {
        let gateway =
            StaticConnectorGateway::from_fixtures(&json!({"bureau": {"score": 1}, "kyc": {}})).unwrap();
        let response = tokio_test::block_on(gateway.call("kyc", &Map::new(), true)).unwrap();

        assert_eq!(response, json!({}));
        assert!(StaticConnectorGateway::from_fixtures(&json!([1])).is_err());
    }
}
