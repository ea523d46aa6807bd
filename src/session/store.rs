//! SQLite-backed session store

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Message, MessageRole, NewMessage, PublicMessage, Session};
use crate::error::Result;

/// Persistence for sessions and their messages
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the session for (project, topic), creating it on first use
    async fn find_or_create_session(&self, project_id: &str, topic_id: &str) -> Result<Session>;

    /// Look up a session without creating it
    async fn get_session(&self, project_id: &str, topic_id: &str) -> Result<Option<Session>>;

    /// Append a message; the store assigns id and a strictly increasing timestamp
    async fn append_message(&self, session_id: &str, message: NewMessage) -> Result<Message>;

    /// All messages of a session in timestamp order, hidden context included
    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Remember the model preference for a session
    async fn set_selected_model(&self, session_id: &str, model: &str) -> Result<()>;

    /// Delete a session's message history. Clearing an unknown session is a no-op.
    async fn clear_session(&self, project_id: &str, topic_id: &str) -> Result<u64>;

    /// Caller-facing history with hidden context stripped
    async fn public_history(&self, session_id: &str) -> Result<Vec<PublicMessage>> {
        Ok(self
            .list_messages(session_id)
            .await?
            .iter()
            .map(Message::to_public)
            .collect())
    }
}

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

fn session_from_row(row: &SqliteRow) -> Session {
    Session {
        id: row.get("id"),
        project_id: row.get("project_id"),
        topic_id: row.get("topic_id"),
        selected_model: row.get("selected_model"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    let role: String = row.get("role");
    Ok(Message {
        id: row.get("id"),
        session_id: row.get("session_id"),
        role: role.parse::<MessageRole>()?,
        content: row.get("content"),
        hidden_context: row.get("hidden_context"),
        model: row.get("model"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn find_or_create_session(&self, project_id: &str, topic_id: &str) -> Result<Session> {
        let now = now_micros();
        // INSERT OR IGNORE keeps this idempotent even if two callers race
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO chat_sessions (id, project_id, topic_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(project_id)
        .bind(topic_id)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let row = sqlx::query(
            r#"
            SELECT id, project_id, topic_id, selected_model, created_at, updated_at
            FROM chat_sessions
            WHERE project_id = $1 AND topic_id = $2
            "#,
        )
        .bind(project_id)
        .bind(topic_id)
        .fetch_one(&self.pool)
        .await?;

        let session = session_from_row(&row);
        if inserted > 0 {
            info!(session_id = %session.id, project_id, topic_id, "Created chat session");
        }
        Ok(session)
    }

    async fn get_session(&self, project_id: &str, topic_id: &str) -> Result<Option<Session>> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, topic_id, selected_model, created_at, updated_at
            FROM chat_sessions
            WHERE project_id = $1 AND topic_id = $2
            "#,
        )
        .bind(project_id)
        .bind(topic_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(session_from_row))
    }

    async fn append_message(&self, session_id: &str, message: NewMessage) -> Result<Message> {
        let mut tx = self.pool.begin().await?;

        let (latest,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(created_at) FROM chat_messages WHERE session_id = $1")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await?;

        // Bump past the latest message so ordering stays strict within one clock tick
        let created_at = match latest {
            Some(latest) => now_micros().max(latest + 1),
            None => now_micros(),
        };
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO chat_messages (id, session_id, role, content, hidden_context, model, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&id)
        .bind(session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.hidden_context)
        .bind(&message.model)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE chat_sessions SET updated_at = $1 WHERE id = $2")
            .bind(created_at)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(session_id, message_id = %id, role = %message.role, "Appended message");

        Ok(Message {
            id,
            session_id: session_id.to_string(),
            role: message.role,
            content: message.content,
            hidden_context: message.hidden_context,
            model: message.model,
            created_at,
        })
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, role, content, hidden_context, model, created_at
            FROM chat_messages
            WHERE session_id = $1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    async fn set_selected_model(&self, session_id: &str, model: &str) -> Result<()> {
        sqlx::query("UPDATE chat_sessions SET selected_model = $1, updated_at = $2 WHERE id = $3")
            .bind(model)
            .bind(now_micros())
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_session(&self, project_id: &str, topic_id: &str) -> Result<u64> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM chat_messages
            WHERE session_id IN (
                SELECT id FROM chat_sessions WHERE project_id = $1 AND topic_id = $2
            )
            "#,
        )
        .bind(project_id)
        .bind(topic_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        info!(project_id, topic_id, deleted, "Cleared chat history");
        Ok(deleted)
    }
}
