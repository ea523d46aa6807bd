// src/intent/catalog.rs
// Immutable intent -> prompt template table

use std::collections::BTreeMap;

use super::IntentKind;
use crate::error::{MontageError, Result};
use crate::functions::FunctionName;

/// Worked example shown to the execution model
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateExample {
    pub input: String,
    pub output: String,
}

/// Everything needed to render the execution prompt for one intent
#[derive(Debug, Clone, PartialEq)]
pub struct IntentTemplate {
    pub intent: IntentKind,
    pub description: String,
    /// Data the preparation stage must gather before rendering
    pub required_functions: Vec<FunctionName>,
    pub instructions: Vec<String>,
    pub output_format: String,
    pub examples: Vec<TemplateExample>,
}

const ORDER_OUTPUT_FORMAT: &str = r#"Respond with a single JSON object and nothing else:
{
  "success": true,
  "newOrder": ["<item id>", {"section": "<section title>"}, "<item id>"],
  "reasoning": "<why this order works>",
  "sectionCount": <number of section markers in newOrder>,
  "changes": ["<one human-readable change per entry>"],
  "error": null
}
If the request cannot be fulfilled, respond with {"success": false, "error": "<reason>"}."#;

fn reorder_template() -> IntentTemplate {
    IntentTemplate {
        intent: IntentKind::Reorder,
        description: "Reorder the project's items so the sequence best serves the user's goals."
            .to_string(),
        required_functions: vec![FunctionName::CurrentOrder, FunctionName::ItemTexts],
        instructions: vec![
            "Use every item id from itemTexts exactly once. Never invent, drop or repeat ids.".into(),
            "If useCurrentOrder is true, start from currentOrder and move as little as needed."
                .into(),
            "You may insert section markers as {\"section\": \"Title\"} between items.".into(),
            "Honor every entry of specificRequests; explain trade-offs in reasoning.".into(),
            "List each meaningful move in changes, in plain language.".into(),
        ],
        output_format: ORDER_OUTPUT_FORMAT.to_string(),
        examples: vec![TemplateExample {
            input: r#"{"itemTexts":{"a":"We finally launched.","b":"Two years ago we started.","c":"Thanks for watching."},"currentOrder":["c","b","a"],"goals":["strong opening"]}"#.into(),
            output: r#"{"success":true,"newOrder":["a",{"section":"Story"},"b","c"],"reasoning":"Open on the payoff, then tell the story.","sectionCount":1,"changes":["Moved the launch moment to the opening","Moved the sign-off to the end"],"error":null}"#.into(),
        }],
    }
}

fn group_template() -> IntentTemplate {
    IntentTemplate {
        intent: IntentKind::Group,
        description: "Group the project's items into labelled sections by topic or theme."
            .to_string(),
        required_functions: vec![
            FunctionName::CurrentOrder,
            FunctionName::ItemTexts,
            FunctionName::ProjectOverview,
        ],
        instructions: vec![
            "Use every item id from itemTexts exactly once. Never invent, drop or repeat ids.".into(),
            "Start every group with a section marker {\"section\": \"Title\"}.".into(),
            "Keep the relative order of items within a group unless the goals say otherwise."
                .into(),
            "sectionCount must equal the number of section markers you emit.".into(),
        ],
        output_format: ORDER_OUTPUT_FORMAT.to_string(),
        examples: vec![TemplateExample {
            input: r#"{"itemTexts":{"a":"Pricing is simple.","b":"Setup takes a minute.","c":"Plans start free."},"currentOrder":["a","b","c"]}"#.into(),
            output: r#"{"success":true,"newOrder":[{"section":"Getting started"},"b",{"section":"Pricing"},"a","c"],"reasoning":"Setup first, then everything about cost.","sectionCount":2,"changes":["Created a Getting started section","Grouped both pricing items"],"error":null}"#.into(),
        }],
    }
}

fn analyze_template() -> IntentTemplate {
    IntentTemplate {
        intent: IntentKind::Analyze,
        description: "Analyze the current ordering and report strengths and weaknesses without changing it."
            .to_string(),
        required_functions: vec![
            FunctionName::CurrentOrder,
            FunctionName::ItemTexts,
            FunctionName::ProjectOverview,
        ],
        instructions: vec![
            "newOrder must be exactly currentOrder, same ids in the same positions, with no section markers.".into(),
            "Put your analysis in reasoning and each concrete suggestion in changes.".into(),
            "sectionCount must be 0.".into(),
        ],
        output_format: ORDER_OUTPUT_FORMAT.to_string(),
        examples: vec![TemplateExample {
            input: r#"{"itemTexts":{"a":"Hello.","b":"Main point."},"currentOrder":["a","b"]}"#.into(),
            output: r#"{"success":true,"newOrder":["a","b"],"reasoning":"The greeting delays the main point.","sectionCount":0,"changes":["Consider opening with the main point"],"error":null}"#.into(),
        }],
    }
}

/// Constructed once and shared by reference; never mutated after construction
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: BTreeMap<IntentKind, IntentTemplate>,
}

impl TemplateCatalog {
    /// Catalog with a template for every [`IntentKind`]
    pub fn builtin() -> Self {
        Self::with_templates(vec![reorder_template(), group_template(), analyze_template()])
    }

    /// Substitute catalog; a later template for the same intent replaces an earlier one
    pub fn with_templates(templates: Vec<IntentTemplate>) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.intent, t)).collect(),
        }
    }

    pub fn get(&self, intent: IntentKind) -> Result<&IntentTemplate> {
        self.templates
            .get(&intent)
            .ok_or_else(|| MontageError::UnknownIntent(intent.to_string()))
    }

    pub fn templates(&self) -> impl Iterator<Item = &IntentTemplate> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_every_intent() {
        let catalog = TemplateCatalog::builtin();
        for kind in IntentKind::ALL {
            let template = catalog.get(kind).unwrap();
            assert_eq!(template.intent, kind);
            assert!(template.required_functions.contains(&FunctionName::ItemTexts));
            assert!(!template.examples.is_empty());
        }
    }

    #[test]
    fn test_substitute_catalog_misses_intents() {
        let catalog = TemplateCatalog::with_templates(vec![analyze_template()]);
        assert_eq!(catalog.len(), 1);
        let err = catalog.get(IntentKind::Reorder).unwrap_err();
        assert_eq!(err.kind(), "unknown_intent_error");
    }

    #[test]
    fn test_examples_are_valid_json() {
        for template in TemplateCatalog::builtin().templates() {
            for example in &template.examples {
                serde_json::from_str::<serde_json::Value>(&example.input).unwrap();
                serde_json::from_str::<serde_json::Value>(&example.output).unwrap();
            }
        }
    }
}
