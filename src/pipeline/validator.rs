// src/pipeline/validator.rs
// Single gate between execution output and the change applier

use std::collections::HashSet;
use tracing::warn;

use super::{StructuredExecutionInput, StructuredExecutionOutput};
use crate::error::{MontageError, OutputMismatch, Result};

/// Structural check of an execution result against the input item count.
///
/// Fails when the model reported failure, when the ordering is empty for a
/// non-empty input, or when the number of item references differs from
/// `original_item_count`.
pub fn validate(output: &StructuredExecutionOutput, original_item_count: usize) -> Result<()> {
    if !output.success {
        let reason = output
            .error
            .clone()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| "execution reported failure without a reason".to_string());
        return Err(MontageError::ExecutionFailed(reason));
    }

    if output.new_order.is_empty() && original_item_count > 0 {
        return Err(OutputMismatch::EmptyOrder.into());
    }

    let actual = output.item_ids().count();
    if actual != original_item_count {
        return Err(OutputMismatch::ItemCount {
            expected: original_item_count,
            actual,
        }
        .into());
    }
    Ok(())
}

/// Full validation against the execution input: counts, identity and per-intent rules
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputValidator;

impl OutputValidator {
    pub fn validate(
        &self,
        input: &StructuredExecutionInput,
        output: &StructuredExecutionOutput,
    ) -> Result<()> {
        let result = self.check(input, output);
        if let Err(e) = &result {
            warn!(intent = %input.intent, error = %e, "Execution output rejected");
        }
        result
    }

    fn check(
        &self,
        input: &StructuredExecutionInput,
        output: &StructuredExecutionOutput,
    ) -> Result<()> {
        validate(output, input.highlight_map.len())?;

        let mut seen = HashSet::new();
        for id in output.item_ids() {
            if !input.highlight_map.contains_key(id) {
                return Err(OutputMismatch::UnknownItem(id.to_string()).into());
            }
            if !seen.insert(id) {
                return Err(OutputMismatch::DuplicateItem(id.to_string()).into());
            }
        }

        if !input.intent.is_ordering() {
            let unchanged = output.new_order.len() == input.current_order.len()
                && output
                    .new_order
                    .iter()
                    .zip(&input.current_order)
                    .all(|(entry, id)| entry.item_id() == Some(id.as_str()));
            if !unchanged {
                return Err(OutputMismatch::OrderChanged.into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentKind;
    use crate::pipeline::OrderEntry;
    use std::collections::BTreeMap;

    fn item(id: &str) -> OrderEntry {
        OrderEntry::Item(id.to_string())
    }

    fn section(title: &str) -> OrderEntry {
        OrderEntry::Section {
            section: title.to_string(),
        }
    }

    fn output(order: Vec<OrderEntry>) -> StructuredExecutionOutput {
        StructuredExecutionOutput {
            success: true,
            new_order: order,
            reasoning: "because".into(),
            section_count: 0,
            changes: vec![],
            error: None,
        }
    }

    fn input(intent: IntentKind, ids: &[&str]) -> StructuredExecutionInput {
        StructuredExecutionInput {
            intent,
            highlight_map: ids
                .iter()
                .map(|id| (id.to_string(), format!("text {}", id)))
                .collect::<BTreeMap<_, _>>(),
            current_order: ids.iter().map(|s| s.to_string()).collect(),
            use_current_order: true,
            goals: vec![],
            specific_requests: vec![],
            user_context: String::new(),
        }
    }

    // ========================================================================
    // validate()
    // ========================================================================

    #[test]
    fn test_failure_propagates_reason() {
        let mut out = output(vec![]);
        out.success = false;
        out.error = Some("clips are too short".into());
        let err = validate(&out, 3).unwrap_err();
        assert!(matches!(err, MontageError::ExecutionFailed(ref r) if r == "clips are too short"));
    }

    #[test]
    fn test_failure_without_reason_is_generic() {
        let mut out = output(vec![item("a")]);
        out.success = false;
        let err = validate(&out, 1).unwrap_err();
        assert!(err.to_string().contains("without a reason"));
    }

    #[test]
    fn test_empty_order_fails() {
        let err = validate(&output(vec![]), 2).unwrap_err();
        assert!(matches!(err, MontageError::OutputMismatch(OutputMismatch::EmptyOrder)));
    }

    #[test]
    fn test_empty_order_for_empty_input_passes() {
        validate(&output(vec![]), 0).unwrap();
    }

    #[test]
    fn test_count_mismatch_reports_both_counts() {
        let err = validate(&output(vec![item("a"), section("S"), item("b")]), 3).unwrap_err();
        match err {
            MontageError::OutputMismatch(OutputMismatch::ItemCount { expected, actual }) => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sections_do_not_count_as_items() {
        validate(
            &output(vec![section("A"), item("a"), section("B"), item("b")]),
            2,
        )
        .unwrap();
    }

    // ========================================================================
    // OutputValidator
    // ========================================================================

    #[test]
    fn test_duplicate_rejected_even_with_right_count() {
        let err = OutputValidator
            .validate(
                &input(IntentKind::Reorder, &["a", "b"]),
                &output(vec![item("a"), item("a")]),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            MontageError::OutputMismatch(OutputMismatch::DuplicateItem(_))
        ));
    }

    #[test]
    fn test_invented_id_rejected() {
        let err = OutputValidator
            .validate(
                &input(IntentKind::Reorder, &["a", "b"]),
                &output(vec![item("a"), item("z")]),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            MontageError::OutputMismatch(OutputMismatch::UnknownItem(ref id)) if id == "z"
        ));
    }

    #[test]
    fn test_reorder_permutation_passes() {
        OutputValidator
            .validate(
                &input(IntentKind::Reorder, &["a", "b", "c"]),
                &output(vec![item("c"), section("S"), item("a"), item("b")]),
            )
            .unwrap();
    }

    #[test]
    fn test_analyze_must_keep_order() {
        let validator = OutputValidator;
        let inp = input(IntentKind::Analyze, &["a", "b", "c"]);
        validator
            .validate(&inp, &output(vec![item("a"), item("b"), item("c")]))
            .unwrap();

        let err = validator
            .validate(&inp, &output(vec![item("b"), item("a"), item("c")]))
            .unwrap_err();
        assert!(matches!(err, MontageError::OutputMismatch(OutputMismatch::OrderChanged)));

        let err = validator
            .validate(&inp, &output(vec![item("a"), section("S"), item("b"), item("c")]))
            .unwrap_err();
        assert!(matches!(err, MontageError::OutputMismatch(OutputMismatch::OrderChanged)));
    }
}
