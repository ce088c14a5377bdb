// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run and node state.
//!
//! [`RunState`] is the durable snapshot of a run: the tree, the context, one
//! [`NodeRecord`] per node and, while paused, the path to the pause node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use stratum_pipeline::{ActivityKind, ExecutionContext, NodeId, SubProcess};

/// Longest log entry kept per line, counted from the end.
const LOG_TAIL_BYTES: usize = 4096;

/// Status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Paused,
    Cancelled,
}

impl RunStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "paused" => Some(Self::Paused),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Cancelled)
    }
}

impl From<NodeStatus> for RunStatus {
    fn from(status: NodeStatus) -> Self {
        match status {
            NodeStatus::Succeeded => Self::Succeeded,
            NodeStatus::Failed => Self::Failed,
            NodeStatus::Paused => Self::Paused,
            NodeStatus::Cancelled => Self::Cancelled,
            NodeStatus::Pending | NodeStatus::Running => Self::Running,
        }
    }
}

/// Status of a single node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Paused,
    Cancelled,
}

impl NodeStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Execution record of one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub status: NodeStatus,
    /// Dispatches so far, across automatic and manual retries.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub log: Vec<String>,
    /// Todo waiting on this node, for pause activities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todo_id: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl NodeRecord {
    /// Append a log line, keeping only its tail.
    pub fn push_log(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref();
        if line.is_empty() {
            return;
        }
        self.log.push(tail(line, LOG_TAIL_BYTES).to_string());
    }
}

fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

/// Where a paused run re-enters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePointer {
    /// Ids from the root down to the pause node.
    pub node_path: Vec<NodeId>,
    pub todo_id: Option<String>,
}

/// Durable snapshot of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub status: RunStatus,
    pub root: SubProcess,
    pub context: ExecutionContext,
    pub nodes: BTreeMap<NodeId, NodeRecord>,
    #[serde(default)]
    pub resume_pointer: Option<ResumePointer>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, root: SubProcess, context: ExecutionContext) -> Self {
        let now = Utc::now();
        let nodes = root
            .descendant_ids()
            .into_iter()
            .map(|id| (id, NodeRecord::default()))
            .collect();
        Self {
            run_id: run_id.into(),
            status: RunStatus::Running,
            root,
            context,
            nodes,
            resume_pointer: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn node_status(&self, id: &NodeId) -> NodeStatus {
        self.nodes.get(id).map(|r| r.status).unwrap_or_default()
    }

    /// Failed activities in declaration order.
    pub fn failed_nodes(&self) -> Vec<NodeId> {
        self.activities_with(NodeStatus::Failed)
    }

    /// Pause activities still waiting for confirmation.
    pub fn paused_nodes(&self) -> Vec<NodeId> {
        self.activities_with(NodeStatus::Paused)
    }

    fn activities_with(&self, status: NodeStatus) -> Vec<NodeId> {
        self.root
            .activities()
            .into_iter()
            .filter(|a| self.node_status(&a.id) == status)
            .map(|a| a.id.clone())
            .collect()
    }

    /// Todos that currently block the run.
    pub fn pending_todos(&self) -> Vec<String> {
        self.paused_nodes()
            .iter()
            .filter_map(|id| self.nodes.get(id)?.todo_id.clone())
            .collect()
    }

    /// Recompute the resume pointer from the first waiting pause node.
    pub fn refresh_resume_pointer(&mut self) {
        self.resume_pointer = self
            .root
            .activities()
            .into_iter()
            .find(|a| a.kind == ActivityKind::Pause && self.node_status(&a.id) == NodeStatus::Paused)
            .and_then(|a| {
                let node_path = self.root.path_to(&a.id)?;
                let todo_id = self.nodes.get(&a.id).and_then(|r| r.todo_id.clone());
                Some(ResumePointer { node_path, todo_id })
            });
    }

    pub fn result(&self) -> RunResult {
        RunResult {
            run_id: self.run_id.clone(),
            status: self.status,
            per_node_outputs: self.context.per_node_outputs.clone(),
            failed_nodes: self.failed_nodes(),
            pending_todos: self.pending_todos(),
        }
    }
}

/// Outcome of `run`, `resume` or `retry_node`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub status: RunStatus,
    pub per_node_outputs: BTreeMap<NodeId, Map<String, Value>>,
    pub failed_nodes: Vec<NodeId>,
    pub pending_todos: Vec<String>,
}

/// Row-level view used when listing runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
