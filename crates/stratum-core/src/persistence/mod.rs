// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for stratum-core.
//!
//! This module defines the persistence abstraction and backend implementations.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryPersistence;
pub use self::sqlite::SqlitePersistence;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::run::{RunState, RunStatus, RunSummary};
use crate::todo::Todo;

/// Durable storage for run snapshots and todos.
///
/// `save_run` is an upsert of the whole snapshot; the last write wins.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Insert or replace the snapshot of a run.
    async fn save_run(&self, state: &RunState) -> Result<(), CoreError>;

    /// Load the latest snapshot of a run.
    async fn load_run(&self, run_id: &str) -> Result<Option<RunState>, CoreError>;

    /// List runs, newest first, optionally filtered by status.
    async fn list_runs(
        &self,
        status: Option<RunStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RunSummary>, CoreError>;

    /// Store a new todo.
    async fn insert_todo(&self, todo: &Todo) -> Result<(), CoreError>;

    async fn get_todo(&self, todo_id: &str) -> Result<Option<Todo>, CoreError>;

    /// Replace a stored todo that is still open.
    ///
    /// The write only lands while the stored copy has status `running`; once
    /// another action has closed the todo this fails with
    /// [`CoreError::TodoAlreadyProcessed`].
    async fn update_todo(&self, todo: &Todo) -> Result<(), CoreError>;

    /// All todos of a run in creation order.
    async fn list_todos(&self, run_id: &str) -> Result<Vec<Todo>, CoreError>;

    /// Check that the backend is reachable.
    async fn health_check_db(&self) -> Result<bool, CoreError>;
}
