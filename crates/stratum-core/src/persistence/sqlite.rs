// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed persistence implementation.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::CoreError;
use crate::run::{RunState, RunStatus, RunSummary};
use crate::todo::{Todo, TodoStatus};

use super::Persistence;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    run_id: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a new SQLite persistence from a file path.
    ///
    /// Creates parent directories and the database file when missing, then
    /// runs all migrations.
    ///
    /// ```ignore
    /// let persistence = SqlitePersistence::from_path(".data/stratum.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::DatabaseError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        Self::connect(&url, 5).await
    }

    /// Connect to an in-memory database; one connection so every query sees
    /// the same data.
    pub async fn in_memory() -> Result<Self, CoreError> {
        Self::connect("sqlite::memory:", 1).await
    }

    async fn connect(url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {}: {}", url, e),
            })?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
    async fn save_run(&self, state: &RunState) -> Result<(), CoreError> {
        let body = serde_json::to_vec(state)?;
        sqlx::query(
            r#"
            INSERT INTO runs (run_id, status, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                status = excluded.status,
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.run_id)
        .bind(state.status.as_str())
        .bind(body)
        .bind(state.created_at)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_run(&self, run_id: &str) -> Result<Option<RunState>, CoreError> {
        let body: Option<Vec<u8>> = sqlx::query_scalar("SELECT state FROM runs WHERE run_id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;

        body.map(|b| serde_json::from_slice(&b).map_err(CoreError::from))
            .transpose()
    }

    async fn list_runs(
        &self,
        status: Option<RunStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RunSummary>, CoreError> {
        let rows = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT run_id, status, created_at, updated_at
            FROM runs
            WHERE (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let status =
                    RunStatus::parse(&row.status).ok_or_else(|| CoreError::DatabaseError {
                        operation: "list_runs".to_string(),
                        details: format!("unknown run status '{}'", row.status),
                    })?;
                Ok(RunSummary {
                    run_id: row.run_id,
                    status,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                })
            })
            .collect()
    }

    async fn insert_todo(&self, todo: &Todo) -> Result<(), CoreError> {
        let body = serde_json::to_vec(todo)?;
        sqlx::query(
            r#"
            INSERT INTO todos (todo_id, run_id, node_id, status, body, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&todo.id)
        .bind(&todo.run_id)
        .bind(todo.node_id.as_str())
        .bind(todo.status.as_str())
        .bind(body)
        .bind(todo.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_todo(&self, todo_id: &str) -> Result<Option<Todo>, CoreError> {
        let body: Option<Vec<u8>> = sqlx::query_scalar("SELECT body FROM todos WHERE todo_id = ?")
            .bind(todo_id)
            .fetch_optional(&self.pool)
            .await?;

        body.map(|b| serde_json::from_slice(&b).map_err(CoreError::from))
            .transpose()
    }

    async fn update_todo(&self, todo: &Todo) -> Result<(), CoreError> {
        let body = serde_json::to_vec(todo)?;
        let result = sqlx::query(
            "UPDATE todos SET status = ?, body = ? WHERE todo_id = ? AND status = ?",
        )
        .bind(todo.status.as_str())
        .bind(body)
        .bind(&todo.id)
        .bind(TodoStatus::Running.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(match self.get_todo(&todo.id).await? {
                Some(stored) => CoreError::TodoAlreadyProcessed {
                    todo_id: stored.id,
                    status: stored.status.as_str().to_string(),
                },
                None => CoreError::TodoNotFound {
                    todo_id: todo.id.clone(),
                },
            });
        }
        Ok(())
    }

    async fn list_todos(&self, run_id: &str) -> Result<Vec<Todo>, CoreError> {
        let bodies: Vec<Vec<u8>> = sqlx::query_scalar(
            "SELECT body FROM todos WHERE run_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        bodies
            .iter()
            .map(|b| serde_json::from_slice(b).map_err(CoreError::from))
            .collect()
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        Ok(one == 1)
    }
}
