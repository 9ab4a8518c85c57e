// HTTP-backed connector gateway with caching and retry

//! # HTTP Connector Gateway
//!
//! Calls the connectors listed in [`GatewayConfig::connectors`]:
//! - `GET` connectors receive the resolved params as a query string
//! - `POST` connectors receive them as a JSON body
//! - any non-2xx status or non-JSON body counts as a failure
//!
//! Failed calls are retried according to [`RetryConfig`]. Successful
//! responses are kept in a process-wide cache for `cache_ttl_secs` when the
//! caller passes `cache_enabled = true`. This cache is shared by every
//! execution using the gateway, unlike the per-execution cache kept in the
//! execution context.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::connectors::ConnectorGateway;
use super::data_source::cache_key;
use crate::config::{ConnectorDefinition, ConnectorMethod, GatewayConfig};
use crate::models::variables::render;
use crate::models::RetryConfig;
use crate::{Result, UnderwriterError};

#[derive(Debug, Clone)]
struct CachedResponse {
    response: Value,
    stored_at: Instant,
}

/// Connector gateway that calls HTTP endpoints
pub struct HttpConnectorGateway {
    client: reqwest::Client,
    connectors: HashMap<String, ConnectorDefinition>,
    cache: DashMap<String, CachedResponse>,
    cache_ttl: Duration,
    retry: RetryConfig,
    request_timeout: Duration,
}

impl HttpConnectorGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| UnderwriterError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            connectors: config
                .connectors
                .iter()
                .map(|connector| (connector.id.clone(), connector.clone()))
                .collect(),
            cache: DashMap::new(),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            retry: config.retry.clone(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    /// Ids of every configured connector
    pub fn connector_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connectors.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn cached(&self, key: &str) -> Option<Value> {
        let fresh = self
            .cache
            .get(key)
            .map(|entry| (entry.stored_at.elapsed() < self.cache_ttl, entry.response.clone()));

        match fresh {
            Some((true, response)) => Some(response),
            Some((false, _)) => {
                self.cache.remove(key);
                None
            }
            None => None,
        }
    }

    /// Cache a response, dropping every expired entry first
    fn store(&self, key: String, response: Value) {
        let ttl = self.cache_ttl;
        self.cache.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        self.cache.insert(
            key,
            CachedResponse {
                response,
                stored_at: Instant::now(),
            },
        );
    }

    async fn request_once(
        &self,
        connector: &ConnectorDefinition,
        params: &Map<String, Value>,
    ) -> std::result::Result<Value, String> {
        let timeout = connector
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.request_timeout);

        let mut request = match connector.method {
            ConnectorMethod::Get => self.client.get(&connector.url).query(&query_pairs(params)),
            ConnectorMethod::Post => self.client.post(&connector.url).json(params),
        };
        for (name, value) in &connector.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| format!("invalid JSON response: {}", e))
    }
}

fn query_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(name, value)| {
            let text = match value {
                Value::Array(_) | Value::Object(_) => value.to_string(),
                scalar => render(scalar),
            };
            (name.clone(), text)
        })
        .collect()
}

#[async_trait]
impl ConnectorGateway for HttpConnectorGateway {
    async fn call(
        &self,
        connector_id: &str,
        params: &Map<String, Value>,
        cache_enabled: bool,
    ) -> Result<Value> {
        let connector = self
            .connectors
            .get(connector_id)
            .ok_or_else(|| UnderwriterError::Connector {
                connector_id: connector_id.to_string(),
                message: "connector not configured".to_string(),
            })?;

        let key = cache_key(connector_id, params);
        if cache_enabled {
            if let Some(response) = self.cached(&key) {
                debug!(connector_id, "Serving connector response from gateway cache");
                return Ok(response);
            }
        }

        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self.request_once(connector, params).await {
                Ok(response) => {
                    if cache_enabled {
                        self.store(key, response.clone());
                    }
                    return Ok(response);
                }
                Err(message) => {
                    last_error = message;
                    if attempt + 1 < attempts {
                        let delay = self.retry.delay_for(attempt);
                        warn!(
                            connector_id,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %last_error,
                            "Connector call failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(UnderwriterError::Connector {
            connector_id: connector_id.to_string(),
            message: format!("{} (after {} attempts)", last_error, attempts),
        })
    }
}
