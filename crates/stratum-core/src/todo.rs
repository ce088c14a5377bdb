// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Manual confirmation items.
//!
//! A pause node creates one [`Todo`]. Exactly one authorised user moves it out
//! of `Running`; the [`TodoPolicy`] decides who is authorised.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use stratum_pipeline::NodeId;
use uuid::Uuid;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    /// Waiting for someone to act.
    Running,
    /// Confirmed; the pause node succeeded.
    Approved,
    /// Rejected; the run was cancelled.
    Terminated,
}

impl TodoStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Approved => "approved",
            Self::Terminated => "terminated",
        }
    }
}

/// What a user does with a todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TodoAction {
    Approve {
        #[serde(default)]
        remark: Option<String>,
    },
    Terminate {
        #[serde(default)]
        remark: Option<String>,
    },
    /// Hand the todo over to other users.
    Deliver {
        processors: Vec<String>,
        #[serde(default)]
        remark: Option<String>,
    },
}

impl TodoAction {
    pub fn approve() -> Self {
        Self::Approve { remark: None }
    }

    pub fn terminate() -> Self {
        Self::Terminate { remark: None }
    }

    fn remark(&self) -> Option<&str> {
        match self {
            Self::Approve { remark } | Self::Terminate { remark } | Self::Deliver { remark, .. } => {
                remark.as_deref()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub run_id: String,
    pub node_id: NodeId,
    pub name: String,
    pub operators: Vec<String>,
    #[serde(default)]
    pub helpers: Vec<String>,
    pub status: TodoStatus,
    #[serde(default)]
    pub context: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub done_by: Option<String>,
    #[serde(default)]
    pub done_at: Option<DateTime<Utc>>,
}

impl Todo {
    pub fn new(
        run_id: impl Into<String>,
        node_id: NodeId,
        name: impl Into<String>,
        operators: Vec<String>,
        helpers: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.into(),
            node_id,
            name: name.into(),
            operators,
            helpers,
            status: TodoStatus::Running,
            context: Map::new(),
            created_at: Utc::now(),
            done_by: None,
            done_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TodoStatus::Running
    }

    /// Operators followed by helpers, without duplicates.
    pub fn recipients(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.operators
            .iter()
            .chain(&self.helpers)
            .filter(|u| seen.insert(u.as_str()))
            .cloned()
            .collect()
    }

    pub(crate) fn close(&mut self, status: TodoStatus, username: &str) {
        self.status = status;
        self.done_by = Some(username.to_string());
        self.done_at = Some(Utc::now());
    }
}

/// Who may act on todos.
#[derive(Debug, Clone)]
pub struct TodoPolicy {
    system_user: String,
    superusers: HashSet<String>,
    allow_superuser: bool,
}

impl Default for TodoPolicy {
    fn default() -> Self {
        Self::new("admin")
    }
}

impl TodoPolicy {
    pub fn new(system_user: impl Into<String>) -> Self {
        Self {
            system_user: system_user.into(),
            superusers: HashSet::new(),
            allow_superuser: true,
        }
    }

    pub fn with_superusers(mut self, superusers: impl IntoIterator<Item = String>) -> Self {
        self.superusers.extend(superusers);
        self
    }

    /// Stop superusers from acting on todos they are not assigned to.
    pub fn deny_superusers(mut self) -> Self {
        self.allow_superuser = false;
        self
    }

    pub fn system_user(&self) -> &str {
        &self.system_user
    }

    /// Check that `username` may act on `todo` right now.
    pub fn authorize(&self, todo: &Todo, username: &str) -> Result<(), CoreError> {
        if !todo.is_open() {
            return Err(CoreError::TodoAlreadyProcessed {
                todo_id: todo.id.clone(),
                status: todo.status.as_str().to_string(),
            });
        }
        if username == self.system_user {
            return Ok(());
        }
        if self.allow_superuser && self.superusers.contains(username) {
            return Ok(());
        }
        if todo.operators.iter().chain(&todo.helpers).any(|u| u == username) {
            return Ok(());
        }
        Err(CoreError::TodoWrongOperator {
            todo_id: todo.id.clone(),
            username: username.to_string(),
        })
    }

    /// Authorise and apply `action` to `todo`.
    pub fn apply(&self, todo: &mut Todo, username: &str, action: &TodoAction) -> Result<(), CoreError> {
        match action {
            TodoAction::Approve { .. } => {
                self.authorize(todo, username)?;
                todo.close(TodoStatus::Approved, username);
            }
            TodoAction::Terminate { .. } => {
                self.authorize(todo, username)?;
                todo.close(TodoStatus::Terminated, username);
            }
            TodoAction::Deliver { processors, .. } => {
                // Only assignees can hand a todo over.
                if !todo.is_open() {
                    return Err(CoreError::TodoAlreadyProcessed {
                        todo_id: todo.id.clone(),
                        status: todo.status.as_str().to_string(),
                    });
                }
                if let Some(pos) = todo.helpers.iter().position(|u| u == username) {
                    todo.helpers.remove(pos);
                    todo.helpers.extend(processors.iter().cloned());
                } else if let Some(pos) = todo.operators.iter().position(|u| u == username) {
                    todo.operators.remove(pos);
                    todo.operators.extend(processors.iter().cloned());
                } else {
                    return Err(CoreError::TodoWrongOperator {
                        todo_id: todo.id.clone(),
                        username: username.to_string(),
                    });
                }
            }
        }
        if let Some(remark) = action.remark() {
            todo.context
                .insert("remark".to_string(), Value::String(remark.to_string()));
        }
        Ok(())
    }
}
