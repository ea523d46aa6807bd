//! Committing validated changes

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::{MontageError, Result};
use crate::functions::ProjectScope;
use crate::intent::IntentKind;
use crate::pipeline::{OrderEntry, StructuredExecutionOutput};

/// Durably commits a validated structural change. Only called after validation passed.
#[async_trait]
pub trait ChangeApplier: Send + Sync {
    /// Returns an identifier for the committed change
    async fn apply(
        &self,
        scope: &ProjectScope,
        intent: IntentKind,
        output: &StructuredExecutionOutput,
    ) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChange {
    pub id: String,
    pub project_id: String,
    pub intent: String,
    pub new_order: Vec<OrderEntry>,
    pub reasoning: String,
    pub section_count: i64,
    pub changes: Vec<String>,
    pub created_at: i64,
}

/// Records applied orderings in `applied_changes`
pub struct SqliteChangeApplier {
    pool: SqlitePool,
}

impl SqliteChangeApplier {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Most recent change for a project
    pub async fn latest_for(&self, project_id: &str) -> Result<Option<AppliedChange>> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, intent, new_order, reasoning, section_count, changes, created_at
            FROM applied_changes
            WHERE project_id = $1
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let new_order: String = row.get("new_order");
        let changes: String = row.get("changes");
        Ok(Some(AppliedChange {
            id: row.get("id"),
            project_id: row.get("project_id"),
            intent: row.get("intent"),
            new_order: serde_json::from_str(&new_order)?,
            reasoning: row.get("reasoning"),
            section_count: row.get("section_count"),
            changes: serde_json::from_str(&changes)?,
            created_at: row.get("created_at"),
        }))
    }
}

#[async_trait]
impl ChangeApplier for SqliteChangeApplier {
    async fn apply(
        &self,
        scope: &ProjectScope,
        intent: IntentKind,
        output: &StructuredExecutionOutput,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO applied_changes (id, project_id, intent, new_order, reasoning, section_count, changes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&id)
        .bind(&scope.project_id)
        .bind(intent.as_str())
        .bind(serde_json::to_string(&output.new_order)?)
        .bind(&output.reasoning)
        .bind(output.section_count as i64)
        .bind(serde_json::to_string(&output.changes)?)
        .bind(chrono::Utc::now().timestamp_micros())
        .execute(&self.pool)
        .await
        .map_err(|e| MontageError::Apply(e.to_string()))?;

        info!(change_id = %id, project_id = %scope.project_id, %intent, "Applied change");
        Ok(id)
    }
}
