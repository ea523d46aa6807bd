//! Conversation -> preparation -> execution pipeline and the output validator

mod conversation;
mod execution;
mod preparation;
mod validator;

pub use conversation::{ConversationOutcome, ConversationStage, DialogueStage, parse_intent_summary};
pub use execution::{ExecutionOutcome, ExecutionStage, parse_execution_output};
pub use preparation::{PreparationStage, PreparedExecution};
pub use validator::{OutputValidator, validate};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::intent::IntentKind;

/// One entry of a proposed ordering: an item id or a structural marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderEntry {
    Item(String),
    Section { section: String },
}

impl OrderEntry {
    pub fn item_id(&self) -> Option<&str> {
        match self {
            Self::Item(id) => Some(id),
            Self::Section { .. } => None,
        }
    }

    pub fn is_section(&self) -> bool {
        matches!(self, Self::Section { .. })
    }
}

/// Typed input of the execution stage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredExecutionInput {
    pub intent: IntentKind,
    /// Item id -> item text, as returned by the function registry
    #[serde(rename = "itemTexts")]
    pub highlight_map: BTreeMap<String, String>,
    pub current_order: Vec<String>,
    pub use_current_order: bool,
    pub goals: Vec<String>,
    pub specific_requests: Vec<String>,
    pub user_context: String,
}

/// Typed result of the execution stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredExecutionOutput {
    pub success: bool,
    #[serde(default, alias = "new_order")]
    pub new_order: Vec<OrderEntry>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, alias = "section_count")]
    pub section_count: usize,
    #[serde(default)]
    pub changes: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StructuredExecutionOutput {
    pub fn item_ids(&self) -> impl Iterator<Item = &str> {
        self.new_order.iter().filter_map(OrderEntry::item_id)
    }

    pub fn section_markers(&self) -> usize {
        self.new_order.iter().filter(|e| e.is_section()).count()
    }
}

/// Slice of `text` from the first `{` to the last `}`, if any
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object_with_noise() {
        let text = "Sure! Here it is:\n```json\n{\"a\": {\"b\": 1}}\n```\nLet me know.";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": 1}}"));
    }

    #[test]
    fn test_extract_json_object_missing() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn test_order_entry_untagged() {
        let entries: Vec<OrderEntry> =
            serde_json::from_str(r#"["a", {"section": "Intro"}, "b"]"#).unwrap();
        assert_eq!(entries[0], OrderEntry::Item("a".into()));
        assert!(entries[1].is_section());
        assert_eq!(entries[2].item_id(), Some("b"));
    }

    #[test]
    fn test_output_defaults_and_aliases() {
        let output: StructuredExecutionOutput =
            serde_json::from_str(r#"{"success": true, "new_order": ["x"], "section_count": 0}"#)
                .unwrap();
        assert_eq!(output.item_ids().collect::<Vec<_>>(), vec!["x"]);
        assert!(output.changes.is_empty());
        assert!(output.error.is_none());
    }

    #[test]
    fn test_input_serializes_item_texts() {
        let input = StructuredExecutionInput {
            intent: IntentKind::Reorder,
            highlight_map: BTreeMap::from([("a".to_string(), "Alpha".to_string())]),
            current_order: vec!["a".into()],
            use_current_order: true,
            goals: vec![],
            specific_requests: vec![],
            user_context: String::new(),
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["itemTexts"]["a"], "Alpha");
        assert_eq!(json["currentOrder"][0], "a");
    }
}
