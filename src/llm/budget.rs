// src/llm/budget.rs
// Token estimation and per-model context limits

use std::collections::HashMap;

/// Limit assumed for models we know nothing about
pub const DEFAULT_CONTEXT_LIMIT: u64 = 8_192;

/// Fixed framing cost charged for every chat message (role markers, separators)
pub const MESSAGE_OVERHEAD_TOKENS: u64 = 4;

/// Context windows of known model families, matched by longest prefix
const KNOWN_LIMITS: &[(&str, u64)] = &[
    ("gpt-4o", 128_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-4-turbo", 128_000),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo", 16_385),
    ("o1", 200_000),
    ("o3", 200_000),
    ("o4-mini", 200_000),
    ("claude", 200_000),
    ("gemini", 1_048_576),
    ("deepseek", 131_072),
    ("mistral", 32_000),
    ("llama3", 8_192),
];

/// Estimate token count for a string (rough estimate: ~4 chars per token).
///
/// Counts characters rather than bytes so multi-byte text is not over-charged.
/// Monotonic in length and free of I/O.
pub fn estimate_tokens(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    (text.chars().count() as u64).div_ceil(4)
}

/// Estimated cost of one chat message including framing overhead
pub fn estimate_message_tokens(content: &str) -> u64 {
    estimate_tokens(content) + MESSAGE_OVERHEAD_TOKENS
}

/// Resolves the context limit for a model name
#[derive(Debug, Clone)]
pub struct TokenBudgeter {
    overrides: HashMap<String, u64>,
    default_limit: u64,
}

impl Default for TokenBudgeter {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl TokenBudgeter {
    /// Override keys are matched case-insensitively, like model names in `limit_for`
    pub fn new(overrides: HashMap<String, u64>) -> Self {
        let overrides = overrides
            .into_iter()
            .map(|(model, limit)| (model.trim().to_lowercase(), limit))
            .collect();
        Self {
            overrides,
            default_limit: DEFAULT_CONTEXT_LIMIT,
        }
    }

    pub fn with_default_limit(mut self, limit: u64) -> Self {
        self.default_limit = limit;
        self
    }

    /// Context limit for `model`; exact overrides win, then the longest known prefix
    pub fn limit_for(&self, model: &str) -> u64 {
        let model = model.trim().to_lowercase();
        if let Some(limit) = self.overrides.get(&model) {
            return *limit;
        }
        KNOWN_LIMITS
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, limit)| *limit)
            .unwrap_or(self.default_limit)
    }

    pub fn estimate(&self, text: &str) -> u64 {
        estimate_tokens(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_empty() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_estimate_tokens_short() {
        // "hello" is 5 chars / 4 = 1.25 -> 2
        assert_eq!(estimate_tokens("hello"), 2);
        assert_eq!(estimate_tokens("abcd"), 1);
    }

    #[test]
    fn test_estimate_tokens_counts_chars_not_bytes() {
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn test_estimate_is_monotonic() {
        let mut previous = 0;
        let mut text = String::new();
        for _ in 0..200 {
            text.push('x');
            let current = estimate_tokens(&text);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_estimate_is_stable() {
        let text = "the same text twice";
        assert_eq!(estimate_tokens(text), estimate_tokens(text));
    }

    #[test]
    fn test_message_overhead() {
        assert_eq!(estimate_message_tokens(""), MESSAGE_OVERHEAD_TOKENS);
        assert_eq!(estimate_message_tokens("abcd"), 1 + MESSAGE_OVERHEAD_TOKENS);
    }

    #[test]
    fn test_limit_for_known_models() {
        let budgeter = TokenBudgeter::default();
        assert_eq!(budgeter.limit_for("gpt-4o-mini"), 128_000);
        assert_eq!(budgeter.limit_for("gpt-4-0613"), 8_192);
        assert_eq!(budgeter.limit_for("claude-3-5-sonnet"), 200_000);
        assert_eq!(budgeter.limit_for("DeepSeek-Chat"), 131_072);
    }

    #[test]
    fn test_limit_for_unknown_model_is_conservative() {
        let budgeter = TokenBudgeter::default();
        assert_eq!(budgeter.limit_for("mystery-model"), DEFAULT_CONTEXT_LIMIT);
        assert_eq!(budgeter.limit_for(""), DEFAULT_CONTEXT_LIMIT);
    }

    #[test]
    fn test_overrides_win() {
        let mut overrides = HashMap::new();
        overrides.insert("gpt-4o".to_string(), 1000);
        let budgeter = TokenBudgeter::new(overrides);
        assert_eq!(budgeter.limit_for("gpt-4o"), 1000);
        // prefix table still applies to other names
        assert_eq!(budgeter.limit_for("gpt-4o-mini"), 128_000);
    }

    #[test]
    fn test_mixed_case_override_is_honored() {
        let mut overrides = HashMap::new();
        overrides.insert("My-Model".to_string(), 1_000);
        overrides.insert("GPT-4o-Custom".to_string(), 2_000);
        let budgeter = TokenBudgeter::new(overrides);
        assert_eq!(budgeter.limit_for("My-Model"), 1_000);
        assert_eq!(budgeter.limit_for("my-model"), 1_000);
        assert_eq!(budgeter.limit_for("gpt-4o-custom"), 2_000);
    }

    #[test]
    fn test_custom_default_limit() {
        let budgeter = TokenBudgeter::default().with_default_limit(2048);
        assert_eq!(budgeter.limit_for("unknown"), 2048);
    }
}
