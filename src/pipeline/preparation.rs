//! Preparation stage: gather data for a confirmed intent and render the execution prompt
//!
//! Pure data assembly. Every identifier in the rendered input comes from the
//! function registry; nothing is invented here.

use futures::future::join_all;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::StructuredExecutionInput;
use crate::error::{MontageError, Result};
use crate::functions::{
    FunctionName, FunctionOutput, FunctionRegistry, FunctionResultSummary, ProjectOverview,
    ProjectScope,
};
use crate::intent::{IntentSummary, IntentTemplate, TemplateCatalog};

/// Everything the execution stage needs, plus a record of the calls made
#[derive(Debug, Clone)]
pub struct PreparedExecution {
    pub template: IntentTemplate,
    pub input: StructuredExecutionInput,
    pub system_prompt: String,
    pub prompt: String,
    pub function_results: Vec<FunctionResultSummary>,
}

pub struct PreparationStage {
    registry: Arc<FunctionRegistry>,
    catalog: Arc<TemplateCatalog>,
}

const EXECUTION_SYSTEM_PROMPT: &str = "You transform structured project data exactly as instructed. \
You have no tools and no conversation history. Reply with one JSON object that matches the required format.";

impl PreparationStage {
    pub fn new(registry: Arc<FunctionRegistry>, catalog: Arc<TemplateCatalog>) -> Self {
        Self { registry, catalog }
    }

    /// Look up the template, call its functions, and render one self-contained prompt.
    ///
    /// Every call's outcome lands in `function_results` before the first
    /// failure (in template order) is returned, so callers can report all of them.
    #[instrument(skip(self, summary, scope, function_results), fields(intent = %summary.intent, project_id = %scope.project_id))]
    pub async fn prepare(
        &self,
        summary: &IntentSummary,
        scope: &ProjectScope,
        function_results: &mut Vec<FunctionResultSummary>,
    ) -> Result<PreparedExecution> {
        let template = self.catalog.get(summary.intent)?.clone();

        let mut current_order: Option<Vec<String>> = None;
        let mut texts: Option<BTreeMap<String, String>> = None;
        let mut overview: Option<ProjectOverview> = None;

        // Functions are independent reads; run them together, record in template order
        let no_args = Value::Null;
        let outputs = join_all(
            template
                .required_functions
                .iter()
                .map(|name| self.registry.call(*name, &no_args, scope)),
        )
        .await;

        let mut first_error = None;
        for (name, result) in template.required_functions.iter().zip(outputs) {
            match result {
                Ok(output) => {
                    function_results.push(FunctionResultSummary {
                        name: name.to_string(),
                        success: true,
                        summary: output.describe(),
                    });
                    match output {
                        FunctionOutput::CurrentOrder(order) => current_order = Some(order),
                        FunctionOutput::ItemTexts(map) => texts = Some(map),
                        FunctionOutput::ProjectOverview(o) => overview = Some(o),
                    }
                }
                Err(e) => {
                    function_results.push(FunctionResultSummary {
                        name: name.to_string(),
                        success: false,
                        summary: e.to_string(),
                    });
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let highlight_map = texts.ok_or_else(|| MontageError::Function {
            name: FunctionName::ItemTexts.to_string(),
            message: format!("template '{}' does not gather item texts", summary.intent),
        })?;
        let current_order = reconcile_order(current_order.unwrap_or_default(), &highlight_map)?;

        let input = StructuredExecutionInput {
            intent: summary.intent,
            highlight_map,
            current_order,
            use_current_order: summary.use_current_order,
            goals: summary.goals.clone(),
            specific_requests: summary.specific_requests.clone(),
            user_context: summary.user_context.clone(),
        };

        let prompt = render_prompt(&template, &input, overview.as_ref())?;
        info!(
            items = input.highlight_map.len(),
            functions = function_results.len(),
            prompt_chars = prompt.len(),
            "Prepared execution prompt"
        );

        Ok(PreparedExecution {
            template,
            input,
            system_prompt: EXECUTION_SYSTEM_PROMPT.to_string(),
            prompt,
            function_results: function_results.clone(),
        })
    }
}

/// Make the current order cover exactly the known items.
///
/// Ids in the order that have no text are an error; items missing from the
/// order are appended in id order.
fn reconcile_order(
    order: Vec<String>,
    highlight_map: &BTreeMap<String, String>,
) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    for id in &order {
        if !highlight_map.contains_key(id) {
            return Err(MontageError::Function {
                name: FunctionName::CurrentOrder.to_string(),
                message: format!("current order references unknown item '{}'", id),
            });
        }
        if !seen.insert(id.clone()) {
            return Err(MontageError::Function {
                name: FunctionName::CurrentOrder.to_string(),
                message: format!("current order lists item '{}' twice", id),
            });
        }
    }

    let mut order = order;
    let missing: Vec<String> = highlight_map
        .keys()
        .filter(|id| !seen.contains(*id))
        .cloned()
        .collect();
    if !missing.is_empty() {
        warn!(count = missing.len(), "Items missing from current order, appending");
        order.extend(missing);
    }
    Ok(order)
}

fn render_prompt(
    template: &IntentTemplate,
    input: &StructuredExecutionInput,
    overview: Option<&ProjectOverview>,
) -> Result<String> {
    let mut prompt = String::new();
    // fmt::Write into a String cannot fail
    let _ = writeln!(prompt, "## Task\n{}\n", template.description);

    let _ = writeln!(prompt, "## Instructions");
    for (i, instruction) in template.instructions.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {}", i + 1, instruction);
    }

    let _ = writeln!(prompt, "\n## Output format\n{}\n", template.output_format);

    if !template.examples.is_empty() {
        let _ = writeln!(prompt, "## Examples");
        for example in &template.examples {
            let _ = writeln!(prompt, "Input: {}\nOutput: {}\n", example.input, example.output);
        }
    }

    if let Some(overview) = overview {
        let _ = writeln!(
            prompt,
            "## Project overview\n{}\n",
            serde_json::to_string(overview)?
        );
    }

    let _ = write!(
        prompt,
        "## Input\n{}",
        serde_json::to_string_pretty(input)?
    );
    Ok(prompt)
}
