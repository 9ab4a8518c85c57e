// External data resolution for dataSource and connector-backed apiCall nodes

//! # Data Source Resolution
//!
//! Two cache layers sit in front of a connector:
//! 1. the execution's own connector cache, checked here before anything else
//!    and keyed by `connectorId:` plus the canonical JSON of the resolved params
//! 2. whatever cross-invocation cache the [`ConnectorGateway`] keeps, driven
//!    by the node's `cacheResponse` hint
//!
//! A fetched response is mapped into variables through `fieldMapping` and
//! stored in the execution cache. When the gateway fails, the node's
//! `onError` policy decides what happens next.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::connectors::ConnectorGateway;
use super::context::ExecutionContext;
use super::handlers::ResolvedData;
use crate::models::variables::{canonical_json, resolve_operand, value_at_path};
use crate::models::{DataSourceConfig, OnErrorPolicy};
use crate::{Result, UnderwriterError};

/// Key under which a response is cached for the rest of the execution
pub fn cache_key(connector_id: &str, params: &Map<String, Value>) -> String {
    format!(
        "{}:{}",
        connector_id,
        canonical_json(&Value::Object(params.clone()))
    )
}

/// Resolve a connector response for the node configured by `config`
pub async fn resolve(
    gateway: &dyn ConnectorGateway,
    config: &DataSourceConfig,
    context: &mut ExecutionContext,
) -> Result<ResolvedData> {
    let params: Map<String, Value> = config
        .params
        .iter()
        .map(|(name, value)| (name.clone(), resolve_operand(value, &context.variables)))
        .collect();
    let key = cache_key(&config.connector_id, &params);

    if let Some(data) = context.cached_response(&key) {
        debug!(connector_id = %config.connector_id, "Connector response served from execution cache");
        return Ok(ResolvedData::Cached { data: data.clone() });
    }

    match gateway
        .call(&config.connector_id, &params, config.cache_response)
        .await
    {
        Ok(response) => {
            if let Some(mapping) = &config.field_mapping {
                apply_field_mapping(mapping, &response, context);
            }
            context.cache_response(key, response.clone());
            Ok(ResolvedData::Fetched { data: response })
        }
        Err(error) => recover(config, &key, context, error),
    }
}

fn apply_field_mapping(mapping: &Map<String, Value>, response: &Value, context: &mut ExecutionContext) {
    for (variable, path) in mapping {
        let Some(path) = path.as_str() else { continue };
        match value_at_path(response, path) {
            Some(value) => context.set_variable(variable.clone(), value.clone()),
            None => debug!(variable = %variable, path, "Mapped response path not present"),
        }
    }
}

fn recover(
    config: &DataSourceConfig,
    key: &str,
    context: &ExecutionContext,
    error: UnderwriterError,
) -> Result<ResolvedData> {
    match config.on_error {
        Some(OnErrorPolicy::Skip) => {
            warn!(connector_id = %config.connector_id, error = %error, "Connector failed, skipping data source");
            Ok(ResolvedData::Skipped)
        }
        Some(OnErrorPolicy::UseCached) => match context.cached_response(key) {
            Some(data) => Ok(ResolvedData::Cached { data: data.clone() }),
            None => Err(error),
        },
        Some(OnErrorPolicy::ManualReview) => Err(UnderwriterError::ManualReviewRequested {
            connector_id: config.connector_id.clone(),
            message: error.to_string(),
        }),
        None => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StaticConnectorGateway;
    use serde_json::json;

    fn config(value: Value) -> DataSourceConfig {
        serde_json::from_value(value).unwrap()
    }

    fn context(value: Value) -> ExecutionContext {
        ExecutionContext::new(value.as_object().cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn test_params_resolved_and_fields_mapped() {
        let gateway = StaticConnectorGateway::new()
            .with_response("bureau", json!({"report": {"score": 712, "open": 3}}));
        let config = config(json!({
            "connectorId": "bureau",
            "params": {"ssn": "applicant_ssn", "product": "personal"},
            "fieldMapping": {"credit_score": "report.score", "ghost": "report.missing"}
        }));
        let mut ctx = context(json!({"applicant_ssn": "123-45-6789"}));

        let resolved = resolve(&gateway, &config, &mut ctx).await.unwrap();

        assert!(matches!(resolved, ResolvedData::Fetched { .. }));
        assert_eq!(ctx.variables["credit_score"], json!(712));
        assert!(!ctx.variables.contains_key("ghost"));

        let calls = gateway.calls().await;
        assert_eq!(calls[0].params["ssn"], json!("123-45-6789"));
        assert_eq!(calls[0].params["product"], json!("personal"));
        assert!(calls[0].cache_enabled);
    }

    #[tokio::test]
    async fn test_second_lookup_hits_execution_cache() {
        let gateway = StaticConnectorGateway::new().with_response("bureau", json!({"score": 1}));
        let config = config(json!({"connectorId": "bureau", "params": {"id": "app"}}));
        let mut ctx = context(json!({"app": 7}));

        resolve(&gateway, &config, &mut ctx).await.unwrap();
        let second = resolve(&gateway, &config, &mut ctx).await.unwrap();

        assert_eq!(second, ResolvedData::Cached { data: json!({"score": 1}) });
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn test_skip_policy_swallows_failure() {
        let gateway = StaticConnectorGateway::new().with_failure("bureau", "timeout");
        let config = config(json!({"connectorId": "bureau", "onError": "skip", "fieldMapping": {"s": "score"}}));
        let mut ctx = context(json!({}));

        let resolved = resolve(&gateway, &config, &mut ctx).await.unwrap();

        assert_eq!(resolved, ResolvedData::Skipped);
        assert!(ctx.variables.is_empty());
    }

    #[tokio::test]
    async fn test_use_cached_policy() {
        let gateway = StaticConnectorGateway::new().with_failure("bureau", "timeout");
        let config = config(json!({"connectorId": "bureau", "onError": "use_cached"}));

        let mut empty = context(json!({}));
        assert!(resolve(&gateway, &config, &mut empty).await.is_err());

        let mut warm = context(json!({}));
        warm.cache_response(cache_key("bureau", &Map::new()), json!({"score": 5}));
        let resolved = resolve(&gateway, &config, &mut warm).await.unwrap();
        assert_eq!(resolved, ResolvedData::Cached { data: json!({"score": 5}) });
    }

    #[tokio::test]
    async fn test_manual_review_and_default_policies() {
        let gateway = StaticConnectorGateway::new().with_failure("bureau", "timeout");

        let review = config(json!({"connectorId": "bureau", "onError": "manual_review"}));
        let err = resolve(&gateway, &review, &mut context(json!({}))).await.unwrap_err();
        assert!(matches!(err, UnderwriterError::ManualReviewRequested { .. }));
        assert!(err.to_string().contains("manual review required"));

        let plain = config(json!({"connectorId": "bureau"}));
        let err = resolve(&gateway, &plain, &mut context(json!({}))).await.unwrap_err();
        assert_eq!(err.to_string(), "Connector 'bureau' failed: timeout");
    }

    #[test]
    fn test_cache_key_ignores_param_order() {
        let a = json!({"b": 1, "a": 2}).as_object().cloned().unwrap();
        let b = json!({"a": 2, "b": 1}).as_object().cloned().unwrap();

        assert_eq!(cache_key("bureau", &a), cache_key("bureau", &b));
        assert_eq!(cache_key("bureau", &a), r#"bureau:{"a":2,"b":1}"#);
    }
}
