// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fluent construction of pipeline trees.
//!
//! A builder collects nodes in declaration order and seals them into a
//! sequential [`SubProcess`] with [`PipelineBuilder::build`]. Sub-builders
//! share the parent's id counter, so nodes from any builder of one run never
//! collide.
//!
//! ```rust,ignore
//! let mut root = PipelineBuilder::new("run-1", registry.clone());
//! root.add_activity(ActivitySpec::new("transfer", "trans_file").kwargs(&kwargs))?;
//!
//! let mut per_cloud = Vec::new();
//! for cloud in clouds {
//!     let mut sub = root.sub_builder();
//!     sub.add_parallel_activities(acts_for(cloud))?;
//!     per_cloud.push(sub.build(format!("cloud {cloud}"))?);
//! }
//! root.add_parallel_sub_pipelines(per_cloud)?;
//! let tree = root.build("standardize")?;
//! ```

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::BuildError;
use crate::node::{Activity, ActivityKind, FanOut, NodeId, PipelineNode, SubProcess};
use crate::registry::{ExecutorKey, ExecutorRegistry};
use crate::retry::RetryPolicy;

/// Description of one activity before it receives an id.
#[derive(Debug, Clone)]
pub struct ActivitySpec {
    name: String,
    executor: ExecutorKey,
    kwargs: Result<Map<String, Value>, String>,
    kind: ActivityKind,
    retry: RetryPolicy,
}

impl ActivitySpec {
    pub fn new(name: impl Into<String>, executor: impl Into<ExecutorKey>) -> Self {
        Self {
            name: name.into(),
            executor: executor.into(),
            kwargs: Ok(Map::new()),
            kind: ActivityKind::Task,
            retry: RetryPolicy::Manual,
        }
    }

    /// A manual-confirmation node.
    pub fn pause(name: impl Into<String>) -> Self {
        Self {
            kind: ActivityKind::Pause,
            ..Self::new(name, ExecutorKey::PAUSE)
        }
    }

    /// Attach kwargs. Anything that does not serialize to a JSON object is
    /// reported when the spec is added to a builder.
    pub fn kwargs<T: Serialize + ?Sized>(mut self, kwargs: &T) -> Self {
        self.kwargs = match serde_json::to_value(kwargs) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(format!("expected a JSON object, got {}", json_kind(&other))),
            Err(e) => Err(e.to_string()),
        };
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Builder for one scope of a pipeline tree.
pub struct PipelineBuilder {
    run_id: String,
    registry: Arc<ExecutorRegistry>,
    next_id: Arc<AtomicU64>,
    children: Vec<PipelineNode>,
    ids: HashSet<NodeId>,
    sealed: bool,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("run_id", &self.run_id)
            .field("children", &self.children.len())
            .field("sealed", &self.sealed)
            .finish()
    }
}

impl PipelineBuilder {
    /// Open the root scope of run `run_id`.
    ///
    /// The builder holds the registry rather than the run's context: executor
    /// keys are checked as nodes are added, while the [`ExecutionContext`]
    /// every node shares is bound when the finished tree is handed to the
    /// executor, so one tree can be planned before its parameters exist.
    ///
    /// [`ExecutionContext`]: crate::ExecutionContext
    pub fn new(run_id: impl Into<String>, registry: Arc<ExecutorRegistry>) -> Self {
        Self {
            run_id: run_id.into(),
            registry,
            next_id: Arc::new(AtomicU64::new(1)),
            children: Vec::new(),
            ids: HashSet::new(),
            sealed: false,
        }
    }

    /// A fresh builder for a nested scope of the same run.
    pub fn sub_builder(&self) -> Self {
        Self {
            run_id: self.run_id.clone(),
            registry: Arc::clone(&self.registry),
            next_id: Arc::clone(&self.next_id),
            children: Vec::new(),
            ids: HashSet::new(),
            sealed: false,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Number of nodes directly in this scope.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Append one activity to this scope.
    pub fn add_activity(&mut self, spec: ActivitySpec) -> Result<NodeId, BuildError> {
        self.ensure_open()?;
        let activity = self.make_activity(spec)?;
        let id = activity.id.clone();
        self.push(PipelineNode::Activity(activity));
        Ok(id)
    }

    /// Append a manual-confirmation node.
    pub fn add_pause(&mut self, name: impl Into<String>) -> Result<NodeId, BuildError> {
        self.add_activity(ActivitySpec::pause(name))
    }

    /// Append one parallel group holding every spec as a leaf.
    ///
    /// Returns `None` and appends nothing when `specs` is empty. Either all
    /// specs are added or none are.
    pub fn add_parallel_activities(
        &mut self,
        specs: impl IntoIterator<Item = ActivitySpec>,
    ) -> Result<Option<NodeId>, BuildError> {
        self.ensure_open()?;
        let activities = specs
            .into_iter()
            .map(|spec| self.make_activity(spec).map(PipelineNode::Activity))
            .collect::<Result<Vec<_>, _>>()?;
        if activities.is_empty() {
            return Ok(None);
        }
        let group = SubProcess {
            id: self.allocate(),
            name: "parallel activities".to_string(),
            fan_out: FanOut::Parallel,
            children: activities,
        };
        let id = group.id.clone();
        self.push(PipelineNode::SubProcess(group));
        Ok(Some(id))
    }

    /// Append an already built sub-pipeline as the next sequential step.
    pub fn add_sub_pipeline(&mut self, sub: SubProcess) -> Result<NodeId, BuildError> {
        self.ensure_open()?;
        let node = PipelineNode::SubProcess(sub);
        self.check_disjoint(&node)?;
        let id = node.id().clone();
        self.push(node);
        Ok(id)
    }

    /// Append one parallel group holding every sub-pipeline.
    ///
    /// Returns `None` and appends nothing when `subs` is empty.
    pub fn add_parallel_sub_pipelines(
        &mut self,
        subs: impl IntoIterator<Item = SubProcess>,
    ) -> Result<Option<NodeId>, BuildError> {
        self.ensure_open()?;
        let children: Vec<PipelineNode> = subs.into_iter().map(PipelineNode::SubProcess).collect();
        if children.is_empty() {
            return Ok(None);
        }
        let group = PipelineNode::SubProcess(SubProcess {
            id: self.allocate(),
            name: "parallel sub pipelines".to_string(),
            fan_out: FanOut::Parallel,
            children,
        });
        self.check_disjoint(&group)?;
        let id = group.id().clone();
        self.push(group);
        Ok(Some(id))
    }

    /// Seal the scope into a sequential sub-process.
    ///
    /// A scope with no children yields an empty sub-process, which the
    /// executor completes immediately. Any later call on this builder fails
    /// with [`BuildError::Sealed`].
    pub fn build(&mut self, name: impl Into<String>) -> Result<SubProcess, BuildError> {
        self.ensure_open()?;
        self.sealed = true;
        let sub = SubProcess {
            id: self.allocate(),
            name: name.into(),
            fan_out: FanOut::Sequential,
            children: std::mem::take(&mut self.children),
        };
        tracing::debug!(
            run_id = %self.run_id,
            node_id = %sub.id,
            name = %sub.name,
            nodes = self.ids.len(),
            "Sealed pipeline scope"
        );
        self.ids.clear();
        Ok(sub)
    }

    fn ensure_open(&self) -> Result<(), BuildError> {
        if self.sealed {
            return Err(BuildError::Sealed {
                run_id: self.run_id.clone(),
            });
        }
        Ok(())
    }

    fn allocate(&self) -> NodeId {
        NodeId::new(format!("n{}", self.next_id.fetch_add(1, Ordering::Relaxed)))
    }

    fn make_activity(&self, spec: ActivitySpec) -> Result<Activity, BuildError> {
        let kwargs = spec.kwargs.map_err(|reason| BuildError::InvalidKwargs {
            node: spec.name.clone(),
            reason,
        })?;
        if spec.kind == ActivityKind::Task && !self.registry.contains(&spec.executor) {
            return Err(BuildError::UnknownExecutor {
                key: spec.executor,
                node: spec.name,
            });
        }
        Ok(Activity {
            id: self.allocate(),
            name: spec.name,
            executor: spec.executor,
            kwargs,
            kind: spec.kind,
            retry: spec.retry,
        })
    }

    fn check_disjoint(&self, node: &PipelineNode) -> Result<(), BuildError> {
        let mut incoming = HashSet::new();
        for id in node.descendant_ids() {
            if self.ids.contains(&id) || !incoming.insert(id.clone()) {
                return Err(BuildError::DuplicateNodeId(id));
            }
        }
        Ok(())
    }

    fn push(&mut self, node: PipelineNode) {
        self.ids.extend(node.descendant_ids());
        self.children.push(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ActivityOutcome;
    use serde_json::json;

    fn registry() -> Arc<ExecutorRegistry> {
        let mut registry = ExecutorRegistry::new();
        registry.register_fn("noop", |_| Ok(ActivityOutcome::succeeded()));
        Arc::new(registry)
    }

    #[test]
    fn test_parallel_activities_shape() {
        let mut builder = PipelineBuilder::new("r1", registry());
        builder
            .add_parallel_activities(
                ["a", "b", "c"]
                    .into_iter()
                    .map(|n| ActivitySpec::new(n, "noop")),
            )
            .unwrap();
        let root = builder.build("root").unwrap();

        assert_eq!(root.fan_out, FanOut::Sequential);
        assert_eq!(root.children.len(), 1);
        let group = root.children[0].as_sub_process().unwrap();
        assert_eq!(group.fan_out, FanOut::Parallel);
        assert_eq!(group.children.len(), 3);
        assert!(group.children.iter().all(|c| c.as_activity().is_some()));
    }

    #[test]
    fn test_build_twice_fails() {
        let mut builder = PipelineBuilder::new("r1", registry());
        builder.build("root").unwrap();
        assert!(matches!(builder.build("again"), Err(BuildError::Sealed { .. })));
        assert!(matches!(
            builder.add_activity(ActivitySpec::new("late", "noop")),
            Err(BuildError::Sealed { .. })
        ));
    }

    #[test]
    fn test_unknown_executor_rejected_at_add() {
        let mut builder = PipelineBuilder::new("r1", registry());
        let err = builder
            .add_activity(ActivitySpec::new("x", "does_not_exist"))
            .unwrap_err();
        assert!(matches!(err, BuildError::UnknownExecutor { ref node, .. } if node == "x"));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_parallel_group_is_all_or_nothing() {
        let mut builder = PipelineBuilder::new("r1", registry());
        let result = builder.add_parallel_activities(vec![
            ActivitySpec::new("ok", "noop"),
            ActivitySpec::new("bad", "missing"),
        ]);
        assert!(result.is_err());
        assert!(builder.is_empty());
    }

    #[test]
    fn test_pause_needs_no_registration() {
        let mut builder = PipelineBuilder::new("r1", registry());
        builder.add_pause("confirm").unwrap();
        let root = builder.build("root").unwrap();
        let pause = root.children[0].as_activity().unwrap();
        assert_eq!(pause.kind, ActivityKind::Pause);
    }

    #[test]
    fn test_non_object_kwargs_rejected() {
        let mut builder = PipelineBuilder::new("r1", registry());
        let err = builder
            .add_activity(ActivitySpec::new("x", "noop").kwargs(&json!([1, 2])))
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidKwargs { .. }));
    }

    #[test]
    fn test_empty_inputs_append_nothing() {
        let mut builder = PipelineBuilder::new("r1", registry());
        assert_eq!(builder.add_parallel_activities(Vec::new()).unwrap(), None);
        assert_eq!(builder.add_parallel_sub_pipelines(Vec::new()).unwrap(), None);
        let root = builder.build("root").unwrap();
        assert!(root.children.is_empty());
    }

    #[test]
    fn test_sub_builders_share_id_space() {
        let mut root = PipelineBuilder::new("r1", registry());
        let subs: Vec<SubProcess> = (0..3)
            .map(|i| {
                let mut sub = root.sub_builder();
                sub.add_activity(ActivitySpec::new(format!("act {i}"), "noop"))
                    .unwrap();
                sub.build(format!("sub {i}")).unwrap()
            })
            .collect();
        root.add_parallel_sub_pipelines(subs).unwrap();
        let tree = root.build("root").unwrap();

        let ids = tree.descendant_ids();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len());
        assert_eq!(tree.activities().len(), 3);
    }

    #[test]
    fn test_foreign_sub_pipeline_collision_rejected() {
        let mut root = PipelineBuilder::new("r1", registry());
        root.add_activity(ActivitySpec::new("first", "noop")).unwrap();

        // An unrelated builder restarts its counter at 1.
        let mut foreign = PipelineBuilder::new("r2", registry());
        foreign
            .add_activity(ActivitySpec::new("other", "noop"))
            .unwrap();
        let sub = foreign.build("foreign").unwrap();

        assert!(matches!(
            root.add_sub_pipeline(sub),
            Err(BuildError::DuplicateNodeId(_))
        ));
    }

    #[test]
    fn test_kwargs_from_struct() {
        #[derive(Serialize)]
        struct Kwargs {
            exec_ip: &'static str,
            bk_cloud_id: u32,
        }
        let mut builder = PipelineBuilder::new("r1", registry());
        builder
            .add_activity(ActivitySpec::new("x", "noop").kwargs(&Kwargs {
                exec_ip: "1.1.1.1",
                bk_cloud_id: 0,
            }))
            .unwrap();
        let root = builder.build("root").unwrap();
        let act = root.children[0].as_activity().unwrap();
        assert_eq!(act.kwargs["exec_ip"], json!("1.1.1.1"));
    }
}
