// Layered configuration for the engine and connector gateways

//! # Configuration
//!
//! Settings are read in layers, later layers overriding earlier ones:
//! 1. Built-in defaults (every field has one, so no file is required)
//! 2. An optional configuration file (TOML, JSON or YAML, chosen by extension)
//! 3. Environment variables prefixed with `UNDERWRITER`, nested with `__`
//!
//! ```text
//! UNDERWRITER__ENGINE__MAX_STEPS_PER_NODE=20
//! UNDERWRITER__GATEWAY__CACHE_TTL_SECS=60
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use ::config::{Config, Environment, File};

use crate::models::RetryConfig;
use crate::Result;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub gateway: GatewayConfig,
}

/// Traversal and evaluation limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Step budget per node; the traversal budget is `node count * max_steps_per_node`
    pub max_steps_per_node: usize,
    /// Upper bound on operations performed by one formula evaluation
    pub expression_max_operations: u64,
    /// Upper bound on expression nesting depth
    pub expression_max_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps_per_node: 10,
            expression_max_operations: 100_000,
            expression_max_depth: 64,
        }
    }
}

/// HTTP method used to call a connector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectorMethod {
    #[default]
    Get,
    Post,
}

/// An external data source reachable over HTTP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorDefinition {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub method: ConnectorMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Overrides the gateway-wide request timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Connector gateway settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub request_timeout_ms: u64,
    /// Lifetime of cross-invocation cached responses
    pub cache_ttl_secs: u64,
    pub retry: RetryConfig,
    pub connectors: Vec<ConnectorDefinition>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            cache_ttl_secs: 300,
            retry: RetryConfig::default(),
            connectors: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("UNDERWRITER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
