// src/config/mod.rs
// Environment-based configuration for the engine, server and CLI

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Read an env var and parse it, falling back to `default` when missing or malformed.
/// Trailing `# comments` and whitespace are stripped before parsing.
fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => {
                    debug!(key, value = clean_val, "config value from environment");
                    parsed
                }
                Err(_) => {
                    warn!(key, value = %val, "config value failed to parse, using default");
                    default
                }
            }
        }
        Err(_) => default,
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse `MONTAGE_MODEL_LIMITS` (`model=tokens,model=tokens`); bad entries are logged and skipped
fn parse_model_limits(raw: &str) -> HashMap<String, u64> {
    let mut limits = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parsed = pair.split_once('=').and_then(|(model, limit)| {
            let model = model.trim();
            let limit = limit.trim().parse::<u64>().ok()?;
            (!model.is_empty()).then(|| (model.to_string(), limit))
        });
        match parsed {
            Some((model, limit)) => {
                limits.insert(model, limit);
            }
            None => warn!(
                key = "MONTAGE_MODEL_LIMITS",
                entry = pair,
                "model limit entry failed to parse, skipping"
            ),
        }
    }
    limits
}

/// Completion service connection settings
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub default_model: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Transport-level retries for 429/5xx and connect failures
    pub max_attempts: u32,
}

/// Sampling and budget knobs for the pipeline stages
#[derive(Debug, Clone)]
pub struct StageConfig {
    /// Tokens held back from every context window for the model's reply
    pub reserved_response_tokens: u64,
    pub conversation_temperature: f32,
    pub conversation_max_tokens: u32,
    pub execution_temperature: f32,
    pub execution_max_tokens: u32,
    /// Deadline for a whole chat turn
    pub turn_timeout: Duration,
}

/// Top-level configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    pub completion: CompletionConfig,
    pub stages: StageConfig,
    /// Per-model context limit overrides
    pub model_limits: HashMap<String, u64>,
    pub host: String,
    pub port: u16,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            default_model: "gpt-4o-mini".to_string(),
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(15),
            max_attempts: 2,
        }
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            reserved_response_tokens: 2048,
            conversation_temperature: 0.7,
            conversation_max_tokens: 1024,
            execution_temperature: 0.2,
            execution_max_tokens: 2048,
            turn_timeout: Duration::from_secs(180),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./montage.db?mode=rwc".to_string(),
            completion: CompletionConfig::default(),
            stages: StageConfig::default(),
            model_limits: HashMap::new(),
            host: "127.0.0.1".to_string(),
            port: 3030,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `.env` (if present) and the process environment
    pub fn from_env() -> Self {
        if dotenvy::dotenv().is_err() {
            debug!(".env file not found, using environment variables and defaults");
        }

        let defaults = Self::default();
        let completion = CompletionConfig {
            base_url: env_var_or("MONTAGE_LLM_BASE_URL", defaults.completion.base_url),
            api_key: env_opt("MONTAGE_LLM_API_KEY").or_else(|| env_opt("OPENAI_API_KEY")),
            default_model: env_var_or("MONTAGE_MODEL", defaults.completion.default_model),
            request_timeout: Duration::from_secs(env_var_or(
                "MONTAGE_LLM_TIMEOUT_SECS",
                defaults.completion.request_timeout.as_secs(),
            )),
            connect_timeout: Duration::from_secs(env_var_or(
                "MONTAGE_LLM_CONNECT_TIMEOUT_SECS",
                defaults.completion.connect_timeout.as_secs(),
            )),
            max_attempts: env_var_or("MONTAGE_LLM_MAX_ATTEMPTS", defaults.completion.max_attempts),
        };

        let stages = StageConfig {
            reserved_response_tokens: env_var_or(
                "MONTAGE_RESERVED_RESPONSE_TOKENS",
                defaults.stages.reserved_response_tokens,
            ),
            conversation_temperature: env_var_or(
                "MONTAGE_CONVERSATION_TEMPERATURE",
                defaults.stages.conversation_temperature,
            ),
            conversation_max_tokens: env_var_or(
                "MONTAGE_CONVERSATION_MAX_TOKENS",
                defaults.stages.conversation_max_tokens,
            ),
            execution_temperature: env_var_or(
                "MONTAGE_EXECUTION_TEMPERATURE",
                defaults.stages.execution_temperature,
            ),
            execution_max_tokens: env_var_or(
                "MONTAGE_EXECUTION_MAX_TOKENS",
                defaults.stages.execution_max_tokens,
            ),
            turn_timeout: Duration::from_secs(env_var_or(
                "MONTAGE_TURN_TIMEOUT_SECS",
                defaults.stages.turn_timeout.as_secs(),
            )),
        };

        let model_limits = env_opt("MONTAGE_MODEL_LIMITS")
            .map(|raw| parse_model_limits(&raw))
            .unwrap_or_default();

        let config = Self {
            database_url: env_var_or("MONTAGE_DATABASE_URL", defaults.database_url),
            completion,
            stages,
            model_limits,
            host: env_var_or("MONTAGE_HOST", defaults.host),
            port: env_var_or("MONTAGE_PORT", defaults.port),
        };

        if config.completion.api_key.is_none() {
            warn!("No completion API key configured (MONTAGE_LLM_API_KEY) - model calls will fail");
        }
        config
    }
}
