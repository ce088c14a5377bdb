// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pipeline tree types.
//!
//! A pipeline is a tree whose root is always a [`SubProcess`]. Interior nodes
//! are sub-processes that run their children either one after another or all
//! at once; leaves are [`Activity`] nodes bound to a registered executor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use strum::{Display, EnumString};

use crate::registry::{ExecutorKey, ExecutorRegistry};
use crate::retry::RetryPolicy;

/// Identifier of a node, unique within one pipeline tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How a sub-process schedules its children.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FanOut {
    /// Children run in declaration order; the first failure stops the rest.
    #[default]
    Sequential,
    /// Children are dispatched together and all of them are awaited.
    Parallel,
}

/// What an activity does when reached.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityKind {
    /// Invokes the bound executor.
    #[default]
    Task,
    /// Suspends the run until a human confirms.
    Pause,
}

/// Leaf node bound to an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: NodeId,
    pub name: String,
    pub executor: ExecutorKey,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    #[serde(default)]
    pub kind: ActivityKind,
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Interior node grouping children under one scheduling mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubProcess {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub fan_out: FanOut,
    #[serde(default)]
    pub children: Vec<PipelineNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineNode {
    Activity(Activity),
    SubProcess(SubProcess),
}

impl PipelineNode {
    pub fn id(&self) -> &NodeId {
        match self {
            Self::Activity(a) => &a.id,
            Self::SubProcess(s) => &s.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Activity(a) => &a.name,
            Self::SubProcess(s) => &s.name,
        }
    }

    pub fn as_activity(&self) -> Option<&Activity> {
        match self {
            Self::Activity(a) => Some(a),
            Self::SubProcess(_) => None,
        }
    }

    pub fn as_sub_process(&self) -> Option<&SubProcess> {
        match self {
            Self::Activity(_) => None,
            Self::SubProcess(s) => Some(s),
        }
    }

    /// Ids of this node and everything below it, depth first.
    pub fn descendant_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, ids: &mut Vec<NodeId>) {
        ids.push(self.id().clone());
        if let Self::SubProcess(sub) = self {
            for child in &sub.children {
                child.collect_ids(ids);
            }
        }
    }
}

impl SubProcess {
    /// Find a node anywhere in this subtree, including the root itself.
    pub fn find(&self, id: &NodeId) -> Option<PipelineNodeRef<'_>> {
        if &self.id == id {
            return Some(PipelineNodeRef::SubProcess(self));
        }
        for child in &self.children {
            match child {
                PipelineNode::Activity(a) if &a.id == id => {
                    return Some(PipelineNodeRef::Activity(a));
                }
                PipelineNode::SubProcess(s) => {
                    if let Some(found) = s.find(id) {
                        return Some(found);
                    }
                }
                PipelineNode::Activity(_) => {}
            }
        }
        None
    }

    /// Ids from this root down to `id`, both ends included.
    pub fn path_to(&self, id: &NodeId) -> Option<Vec<NodeId>> {
        if &self.id == id {
            return Some(vec![self.id.clone()]);
        }
        for child in &self.children {
            let tail = match child {
                PipelineNode::Activity(a) if &a.id == id => Some(vec![a.id.clone()]),
                PipelineNode::Activity(_) => None,
                PipelineNode::SubProcess(s) => s.path_to(id),
            };
            if let Some(mut tail) = tail {
                let mut path = vec![self.id.clone()];
                path.append(&mut tail);
                return Some(path);
            }
        }
        None
    }

    /// All activities in depth-first declaration order.
    pub fn activities(&self) -> Vec<&Activity> {
        let mut out = Vec::new();
        self.collect_activities(&mut out);
        out
    }

    fn collect_activities<'a>(&'a self, out: &mut Vec<&'a Activity>) {
        for child in &self.children {
            match child {
                PipelineNode::Activity(a) => out.push(a),
                PipelineNode::SubProcess(s) => s.collect_activities(out),
            }
        }
    }

    /// Ids of this sub-process and everything below it, depth first.
    pub fn descendant_ids(&self) -> Vec<NodeId> {
        let mut ids = vec![self.id.clone()];
        for child in &self.children {
            child.collect_ids(&mut ids);
        }
        ids
    }

    /// Check a tree that did not come from a builder, e.g. one loaded from
    /// storage, against the same rules the builder enforces.
    pub fn validate(&self, registry: &ExecutorRegistry) -> Result<(), crate::BuildError> {
        let mut seen = std::collections::HashSet::new();
        for id in self.descendant_ids() {
            if !seen.insert(id.clone()) {
                return Err(crate::BuildError::DuplicateNodeId(id));
            }
        }
        for activity in self.activities() {
            if activity.kind == ActivityKind::Task && !registry.contains(&activity.executor) {
                return Err(crate::BuildError::UnknownExecutor {
                    key: activity.executor.clone(),
                    node: activity.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Borrowed view of a node located by [`SubProcess::find`].
#[derive(Debug, Clone, Copy)]
pub enum PipelineNodeRef<'a> {
    Activity(&'a Activity),
    SubProcess(&'a SubProcess),
}

impl PipelineNodeRef<'_> {
    pub fn id(&self) -> &NodeId {
        match self {
            Self::Activity(a) => &a.id,
            Self::SubProcess(s) => &s.id,
        }
    }

    pub fn descendant_ids(&self) -> Vec<NodeId> {
        match self {
            Self::Activity(a) => vec![a.id.clone()],
            Self::SubProcess(s) => s.descendant_ids(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str) -> PipelineNode {
        PipelineNode::Activity(Activity {
            id: NodeId::from(id),
            name: id.to_string(),
            executor: ExecutorKey::from("noop"),
            kwargs: Map::new(),
            kind: ActivityKind::Task,
            retry: RetryPolicy::Manual,
        })
    }

    fn tree() -> SubProcess {
        SubProcess {
            id: NodeId::from("root"),
            name: "root".to_string(),
            fan_out: FanOut::Sequential,
            children: vec![
                leaf("a"),
                PipelineNode::SubProcess(SubProcess {
                    id: NodeId::from("p"),
                    name: "p".to_string(),
                    fan_out: FanOut::Parallel,
                    children: vec![leaf("b"), leaf("c")],
                }),
            ],
        }
    }

    #[test]
    fn test_path_to_nested_leaf() {
        let path = tree().path_to(&NodeId::from("c")).unwrap();
        let path: Vec<&str> = path.iter().map(|id| id.as_str()).collect();
        assert_eq!(path, vec!["root", "p", "c"]);
        assert!(tree().path_to(&NodeId::from("missing")).is_none());
    }

    #[test]
    fn test_activities_in_declaration_order() {
        let t = tree();
        let names: Vec<&str> = t.activities().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_tree_serializes_with_type_tag() {
        let json = serde_json::to_value(tree()).unwrap();
        assert_eq!(json["children"][0]["type"], "activity");
        assert_eq!(json["children"][1]["type"], "sub_process");
        assert_eq!(json["children"][1]["fan_out"], "parallel");
        let back: SubProcess = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree());
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut t = tree();
        t.children.push(leaf("a"));
        let mut registry = ExecutorRegistry::new();
        registry.register_fn("noop", |_| Ok(crate::ActivityOutcome::succeeded()));
        assert!(matches!(
            t.validate(&registry),
            Err(crate::BuildError::DuplicateNodeId(id)) if id.as_str() == "a"
        ));
    }
}
