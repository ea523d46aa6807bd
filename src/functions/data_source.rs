// src/functions/data_source.rs
// Where project items come from

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

use super::ProjectScope;
use crate::error::{MontageError, Result};

/// An addressable unit of project content
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectItem {
    pub id: String,
    #[serde(default)]
    pub text: String,
}

/// Read-only access to a project's items and their current ordering
#[async_trait]
pub trait ProjectDataSource: Send + Sync {
    async fn items(&self, scope: &ProjectScope) -> Result<Vec<ProjectItem>>;

    /// Item ids in their current order
    async fn current_order(&self, scope: &ProjectScope) -> Result<Vec<String>>;
}

/// Decoded `contextData`: `{"items": [{"id": "...", "text": "..."}], "order": ["..."]}`
#[derive(Debug, Default, Deserialize)]
pub struct ContextPayload {
    #[serde(default)]
    pub items: Vec<ProjectItem>,
    #[serde(default)]
    pub order: Option<Vec<String>>,
}

/// Decode and check `contextData`. Null is an empty project; item ids must be
/// non-empty and unique, and `order` may only name listed items.
pub fn parse_context_payload(context_data: &Value) -> Result<ContextPayload> {
    if context_data.is_null() {
        return Ok(ContextPayload::default());
    }
    let payload = ContextPayload::deserialize(context_data)
        .map_err(|e| MontageError::Validation(format!("malformed contextData: {}", e)))?;

    let mut seen = HashSet::new();
    for item in &payload.items {
        if item.id.trim().is_empty() {
            return Err(MontageError::Validation(
                "contextData item with empty id".to_string(),
            ));
        }
        if !seen.insert(item.id.as_str()) {
            return Err(MontageError::Validation(format!(
                "contextData item '{}' listed twice",
                item.id
            )));
        }
    }
    if let Some(order) = &payload.order {
        if let Some(unknown) = order.iter().find(|id| !seen.contains(id.as_str())) {
            return Err(MontageError::Validation(format!(
                "contextData order references unknown item '{}'",
                unknown
            )));
        }
    }
    Ok(payload)
}

/// Reads items from the request's `contextData` (see [`ContextPayload`]).
///
/// Without `order`, items are taken in listed order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextDataSource;

#[async_trait]
impl ProjectDataSource for ContextDataSource {
    async fn items(&self, scope: &ProjectScope) -> Result<Vec<ProjectItem>> {
        Ok(parse_context_payload(&scope.context_data)?.items)
    }

    async fn current_order(&self, scope: &ProjectScope) -> Result<Vec<String>> {
        let payload = parse_context_payload(&scope.context_data)?;
        Ok(payload
            .order
            .unwrap_or_else(|| payload.items.into_iter().map(|i| i.id).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope(data: serde_json::Value) -> ProjectScope {
        ProjectScope::new("p", "t", data)
    }

    #[tokio::test]
    async fn test_order_defaults_to_item_order() {
        let s = scope(json!({"items": [{"id": "x", "text": "1"}, {"id": "y", "text": "2"}]}));
        let order = ContextDataSource.current_order(&s).await.unwrap();
        assert_eq!(order, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_null_context_is_empty_project() {
        let s = scope(serde_json::Value::Null);
        assert!(ContextDataSource.items(&s).await.unwrap().is_empty());
        assert!(ContextDataSource.current_order(&s).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_with_unknown_item_rejected() {
        let s = scope(json!({"items": [{"id": "x"}], "order": ["x", "ghost"]}));
        let err = ContextDataSource.current_order(&s).await.unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_items_must_be_a_list() {
        let err = parse_context_payload(&json!({"items": "nope"})).unwrap_err();
        assert!(matches!(err, MontageError::Validation(_)));
    }

    #[tokio::test]
    async fn test_duplicate_items_rejected() {
        let s = scope(json!({"items": [{"id": "x"}, {"id": "x"}]}));
        assert!(ContextDataSource.items(&s).await.is_err());
    }
}
