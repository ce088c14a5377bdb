// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process persistence for embedding and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::CoreError;
use crate::run::{RunState, RunStatus, RunSummary};
use crate::todo::Todo;

use super::Persistence;

#[derive(Debug, Default)]
pub struct MemoryPersistence {
    runs: Mutex<HashMap<String, RunState>>,
    todos: Mutex<Vec<Todo>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn save_run(&self, state: &RunState) -> Result<(), CoreError> {
        self.runs
            .lock()
            .await
            .insert(state.run_id.clone(), state.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: &str) -> Result<Option<RunState>, CoreError> {
        Ok(self.runs.lock().await.get(run_id).cloned())
    }

    async fn list_runs(
        &self,
        status: Option<RunStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RunSummary>, CoreError> {
        let runs = self.runs.lock().await;
        let mut summaries: Vec<RunSummary> = runs
            .values()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .map(|r| RunSummary {
                run_id: r.run_id.clone(),
                status: r.status,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn insert_todo(&self, todo: &Todo) -> Result<(), CoreError> {
        let mut todos = self.todos.lock().await;
        if todos.iter().any(|t| t.id == todo.id) {
            return Err(CoreError::DatabaseError {
                operation: "insert_todo".to_string(),
                details: format!("todo '{}' already exists", todo.id),
            });
        }
        todos.push(todo.clone());
        Ok(())
    }

    async fn get_todo(&self, todo_id: &str) -> Result<Option<Todo>, CoreError> {
        Ok(self
            .todos
            .lock()
            .await
            .iter()
            .find(|t| t.id == todo_id)
            .cloned())
    }

    async fn update_todo(&self, todo: &Todo) -> Result<(), CoreError> {
        let mut todos = self.todos.lock().await;
        match todos.iter_mut().find(|t| t.id == todo.id) {
            Some(slot) if slot.is_open() => {
                *slot = todo.clone();
                Ok(())
            }
            Some(slot) => Err(CoreError::TodoAlreadyProcessed {
                todo_id: slot.id.clone(),
                status: slot.status.as_str().to_string(),
            }),
            None => Err(CoreError::TodoNotFound {
                todo_id: todo.id.clone(),
            }),
        }
    }

    async fn list_todos(&self, run_id: &str) -> Result<Vec<Todo>, CoreError> {
        Ok(self
            .todos
            .lock()
            .await
            .iter()
            .filter(|t| t.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        Ok(true)
    }
}
