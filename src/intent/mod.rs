//! Intents the engine can carry out and the prompt templates behind them

mod catalog;

pub use catalog::{IntentTemplate, TemplateCatalog, TemplateExample};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MontageError;

/// Closed set of supported intents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    /// Produce a new ordering of all items
    Reorder,
    /// Cluster items into labelled sections (also an ordering)
    Group,
    /// Comment on the current ordering without changing it
    Analyze,
}

impl IntentKind {
    pub const ALL: [IntentKind; 3] = [IntentKind::Reorder, IntentKind::Group, IntentKind::Analyze];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reorder => "reorder",
            Self::Group => "group",
            Self::Analyze => "analyze",
        }
    }

    /// Ordering-type intents must reference every input item exactly once
    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Reorder | Self::Group)
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentKind {
    type Err = MontageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reorder" => Ok(Self::Reorder),
            "group" => Ok(Self::Group),
            "analyze" | "analyse" => Ok(Self::Analyze),
            other => Err(MontageError::UnknownIntent(other.to_string())),
        }
    }
}

/// Confirmed statement of what the user wants done
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentSummary {
    pub intent: IntentKind,
    pub use_current_order: bool,
    pub goals: Vec<String>,
    pub specific_requests: Vec<String>,
    pub user_context: String,
    pub confirmed: bool,
}

/// Intent summary as the model writes it; the intent is still free text here
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentSummaryWire {
    pub intent: String,
    #[serde(default, alias = "use_current_order")]
    pub use_current_order: bool,
    #[serde(default, alias = "optimizationGoals")]
    pub goals: Vec<String>,
    #[serde(default, alias = "specific_requests")]
    pub specific_requests: Vec<String>,
    #[serde(default, alias = "user_context")]
    pub user_context: String,
    pub confirmed: bool,
}

impl TryFrom<IntentSummaryWire> for IntentSummary {
    type Error = MontageError;

    fn try_from(wire: IntentSummaryWire) -> Result<Self, Self::Error> {
        Ok(Self {
            intent: wire.intent.parse()?,
            use_current_order: wire.use_current_order,
            goals: wire.goals,
            specific_requests: wire.specific_requests,
            user_context: wire.user_context,
            confirmed: wire.confirmed,
        })
    }
}
