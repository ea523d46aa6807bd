//! Read-only data-gathering functions used by the preparation stage
//!
//! Functions are looked up by [`FunctionName`] and return a typed
//! [`FunctionOutput`]. They are never exposed to the user or to the
//! execution model.

mod data_source;

pub use data_source::{
    ContextDataSource, ContextPayload, ProjectDataSource, ProjectItem, parse_context_payload,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{MontageError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionName {
    #[serde(rename = "get_current_order")]
    CurrentOrder,
    #[serde(rename = "get_item_texts")]
    ItemTexts,
    #[serde(rename = "get_project_overview")]
    ProjectOverview,
}

impl FunctionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentOrder => "get_current_order",
            Self::ItemTexts => "get_item_texts",
            Self::ProjectOverview => "get_project_overview",
        }
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which project (and which request payload) a function reads from
#[derive(Debug, Clone, Default)]
pub struct ProjectScope {
    pub project_id: String,
    pub topic_id: String,
    /// Caller-supplied project data (`contextData`)
    pub context_data: Value,
}

impl ProjectScope {
    pub fn new(project_id: impl Into<String>, topic_id: impl Into<String>, context_data: Value) -> Self {
        Self {
            project_id: project_id.into(),
            topic_id: topic_id.into(),
            context_data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectOverview {
    pub item_count: usize,
    pub ordered_count: usize,
    pub total_chars: usize,
}

/// Typed result per function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionOutput {
    CurrentOrder(Vec<String>),
    ItemTexts(BTreeMap<String, String>),
    ProjectOverview(ProjectOverview),
}

impl FunctionOutput {
    /// One-line description for `functionResults`
    pub fn describe(&self) -> String {
        match self {
            Self::CurrentOrder(order) => format!("{} items in current order", order.len()),
            Self::ItemTexts(texts) => format!("{} item texts", texts.len()),
            Self::ProjectOverview(o) => format!(
                "{} items, {} ordered, {} characters",
                o.item_count, o.ordered_count, o.total_chars
            ),
        }
    }
}

/// Record of one function invocation, returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResultSummary {
    pub name: String,
    pub success: bool,
    pub summary: String,
}

#[async_trait]
pub trait ProjectFunction: Send + Sync {
    fn name(&self) -> FunctionName;

    async fn call(&self, args: &Value, scope: &ProjectScope) -> Result<FunctionOutput>;
}

struct CurrentOrderFn {
    source: Arc<dyn ProjectDataSource>,
}

#[async_trait]
impl ProjectFunction for CurrentOrderFn {
    fn name(&self) -> FunctionName {
        FunctionName::CurrentOrder
    }

    async fn call(&self, _args: &Value, scope: &ProjectScope) -> Result<FunctionOutput> {
        Ok(FunctionOutput::CurrentOrder(
            self.source.current_order(scope).await?,
        ))
    }
}

/// Optional args: `{"ids": [...]}` limits the result to those items
struct ItemTextsFn {
    source: Arc<dyn ProjectDataSource>,
}

#[async_trait]
impl ProjectFunction for ItemTextsFn {
    fn name(&self) -> FunctionName {
        FunctionName::ItemTexts
    }

    async fn call(&self, args: &Value, scope: &ProjectScope) -> Result<FunctionOutput> {
        let wanted: Option<Vec<&str>> = args
            .get("ids")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).collect());

        let texts = self
            .source
            .items(scope)
            .await?
            .into_iter()
            .filter(|item| {
                wanted
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&item.id.as_str()))
            })
            .map(|item| (item.id, item.text))
            .collect();
        Ok(FunctionOutput::ItemTexts(texts))
    }
}

struct ProjectOverviewFn {
    source: Arc<dyn ProjectDataSource>,
}

#[async_trait]
impl ProjectFunction for ProjectOverviewFn {
    fn name(&self) -> FunctionName {
        FunctionName::ProjectOverview
    }

    async fn call(&self, _args: &Value, scope: &ProjectScope) -> Result<FunctionOutput> {
        let items = self.source.items(scope).await?;
        let order = self.source.current_order(scope).await?;
        Ok(FunctionOutput::ProjectOverview(ProjectOverview {
            item_count: items.len(),
            ordered_count: order.len(),
            total_chars: items.iter().map(|i| i.text.chars().count()).sum(),
        }))
    }
}

/// Immutable name -> function table, built once and shared
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<FunctionName, Arc<dyn ProjectFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in functions reading from `source`
    pub fn with_data_source(source: Arc<dyn ProjectDataSource>) -> Self {
        Self::new()
            .register(Arc::new(CurrentOrderFn {
                source: source.clone(),
            }))
            .register(Arc::new(ItemTextsFn {
                source: source.clone(),
            }))
            .register(Arc::new(ProjectOverviewFn { source }))
    }

    pub fn register(mut self, function: Arc<dyn ProjectFunction>) -> Self {
        self.functions.insert(function.name(), function);
        self
    }

    pub fn contains(&self, name: FunctionName) -> bool {
        self.functions.contains_key(&name)
    }

    /// Invoke a function; failures are wrapped as `MontageError::Function`
    pub async fn call(
        &self,
        name: FunctionName,
        args: &Value,
        scope: &ProjectScope,
    ) -> Result<FunctionOutput> {
        let function = self.functions.get(&name).ok_or_else(|| MontageError::Function {
            name: name.to_string(),
            message: "function is not registered".to_string(),
        })?;

        match function.call(args, scope).await {
            Ok(output) => {
                debug!(function = %name, project_id = %scope.project_id, result = %output.describe(), "Function call complete");
                Ok(output)
            }
            Err(e @ MontageError::Function { .. }) => Err(e),
            Err(e) => {
                warn!(function = %name, project_id = %scope.project_id, error = %e, "Function call failed");
                Err(MontageError::Function {
                    name: name.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> ProjectScope {
        ProjectScope::new(
            "p1",
            "chat",
            json!({
                "items": [
                    {"id": "a", "text": "Alpha"},
                    {"id": "b", "text": "Bravo"},
                    {"id": "c", "text": "Charlie"}
                ],
                "order": ["c", "a", "b"]
            }),
        )
    }

    fn registry() -> FunctionRegistry {
        FunctionRegistry::with_data_source(Arc::new(ContextDataSource))
    }

    #[tokio::test]
    async fn test_current_order() {
        let out = registry()
            .call(FunctionName::CurrentOrder, &Value::Null, &scope())
            .await
            .unwrap();
        assert_eq!(
            out,
            FunctionOutput::CurrentOrder(vec!["c".into(), "a".into(), "b".into()])
        );
    }

    #[tokio::test]
    async fn test_item_texts_with_filter() {
        let all = registry()
            .call(FunctionName::ItemTexts, &Value::Null, &scope())
            .await
            .unwrap();
        match all {
            FunctionOutput::ItemTexts(texts) => assert_eq!(texts.len(), 3),
            other => panic!("unexpected {:?}", other),
        }

        let some = registry()
            .call(FunctionName::ItemTexts, &json!({"ids": ["b"]}), &scope())
            .await
            .unwrap();
        match some {
            FunctionOutput::ItemTexts(texts) => {
                assert_eq!(texts.len(), 1);
                assert_eq!(texts["b"], "Bravo");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_project_overview() {
        let out = registry()
            .call(FunctionName::ProjectOverview, &Value::Null, &scope())
            .await
            .unwrap();
        assert_eq!(out.describe(), "3 items, 3 ordered, 17 characters");
    }

    #[tokio::test]
    async fn test_unregistered_function() {
        let err = FunctionRegistry::new()
            .call(FunctionName::CurrentOrder, &Value::Null, &scope())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "function_error");
        assert!(err.to_string().contains("get_current_order"));
    }

    #[tokio::test]
    async fn test_bad_context_data_is_function_error() {
        let bad = ProjectScope::new("p1", "chat", json!({"items": "nope"}));
        let err = registry()
            .call(FunctionName::ItemTexts, &Value::Null, &bad)
            .await
            .unwrap_err();
        assert!(matches!(err, MontageError::Function { .. }));
    }
}
