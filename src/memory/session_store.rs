//! Session persistence
//!
//! Get/put by session id. The in-memory backend serves tests and development;
//! Postgres keeps each session as one JSONB document.

use crate::error::AssistantError;
use crate::memory::store::Session;
use crate::Result;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<Session>>;

    async fn put(&self, session: &Session) -> Result<()>;
}

#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn put(&self, session: &Session) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }
}

pub struct PgSessionStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS chat_sessions (
                      session_id TEXT PRIMARY KEY,
                      principal TEXT NOT NULL,
                      state JSONB NOT NULL,
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AssistantError::DatabaseError(format!(
                    "Failed to initialize session schema: {}",
                    e
                ))
            })?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for PgSessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT state FROM chat_sessions WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AssistantError::StateError(format!("Failed to load session {}: {}", session_id, e))
            })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let Json(session): Json<Session> = row.try_get("state").map_err(|e| {
            AssistantError::StateError(format!("Corrupt session {}: {}", session_id, e))
        })?;

        Ok(Some(session))
    }

    async fn put(&self, session: &Session) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO chat_sessions (session_id, principal, state, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (session_id)
            DO UPDATE SET state = EXCLUDED.state, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&session.session_id)
        .bind(&session.principal)
        .bind(Json(session))
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AssistantError::StateError(format!(
                "Failed to save session {}: {}",
                session.session_id, e
            ))
        })?;

        Ok(())
    }
}
