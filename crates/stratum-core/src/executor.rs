// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable pipeline executor.
//!
//! [`PipelineExecutor`] walks a pipeline tree, dispatching activities to the
//! registered executors and recording one [`NodeRecord`] per node:
//!
//! - sequential scopes stop at the first child that does not succeed
//! - parallel scopes dispatch all children and await every one of them, so a
//!   failing branch never cancels its siblings
//! - pause activities create a [`Todo`], persist the run and return PAUSED
//! - the run snapshot is checkpointed after every activity, so a fresh
//!   executor over the same store can resume it
//!
//! Cancellation is cooperative and checked only before a node starts; an
//! activity that is already running always finishes.
//!
//! Every operation that drives or rewrites a run first claims it in this
//! executor's active set and only then reads its persisted status, so two
//! passes over the same run never overlap within one process.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, join_all};
use serde_json::Value;
use stratum_pipeline::{
    Activity, ActivityInput, ActivityKind, ExecutionContext, ExecutorRegistry, FanOut, NodeId,
    PipelineNode, RetryPolicy, SharedContext, SubProcess,
};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::notify::Notifier;
use crate::persistence::Persistence;
use crate::run::{NodeRecord, NodeStatus, RunResult, RunState, RunStatus, RunSummary};
use crate::todo::{Todo, TodoAction, TodoPolicy, TodoStatus};

const DEFAULT_MAX_PARALLELISM: usize = 16;

/// Builder for creating a [`PipelineExecutor`].
pub struct ExecutorBuilder {
    persistence: Option<Arc<dyn Persistence>>,
    registry: Option<Arc<ExecutorRegistry>>,
    notifier: Option<Arc<dyn Notifier>>,
    max_parallelism: usize,
    todo_policy: TodoPolicy,
}

impl std::fmt::Debug for ExecutorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorBuilder")
            .field("persistence", &self.persistence.as_ref().map(|_| "..."))
            .field("registry", &self.registry)
            .field("notifier", &self.notifier.as_ref().map(|_| "..."))
            .field("max_parallelism", &self.max_parallelism)
            .field("todo_policy", &self.todo_policy)
            .finish()
    }
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self {
            persistence: None,
            registry: None,
            notifier: None,
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            todo_policy: TodoPolicy::default(),
        }
    }
}

impl ExecutorBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply parallelism and todo settings from a loaded [`Config`].
    pub fn config(mut self, config: &Config) -> Self {
        self.max_parallelism = config.max_parallelism;
        self.todo_policy =
            TodoPolicy::new(config.system_user.clone()).with_superusers(config.superusers.clone());
        self
    }

    /// Set the persistence layer (required).
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Set the executor registry (required).
    pub fn registry(mut self, registry: Arc<ExecutorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the todo notifier.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Bound on activities running at once across all runs of this executor.
    ///
    /// Default: 16
    pub fn max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism;
        self
    }

    pub fn todo_policy(mut self, policy: TodoPolicy) -> Self {
        self.todo_policy = policy;
        self
    }

    /// Build the executor.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> anyhow::Result<PipelineExecutor> {
        let persistence = self
            .persistence
            .ok_or_else(|| anyhow::anyhow!("persistence is required"))?;
        let registry = self
            .registry
            .ok_or_else(|| anyhow::anyhow!("registry is required"))?;
        if self.max_parallelism == 0 {
            anyhow::bail!("max_parallelism must be at least 1");
        }

        Ok(PipelineExecutor {
            persistence,
            registry,
            notifier: self.notifier,
            permits: Arc::new(Semaphore::new(self.max_parallelism)),
            todo_policy: self.todo_policy,
            active: StdMutex::new(HashMap::new()),
        })
    }
}

/// Result of processing a todo.
#[derive(Debug, Clone)]
pub struct TodoOutcome {
    pub todo: Todo,
    /// Run state after the action, when the action touched the run.
    pub run: Option<RunResult>,
}

/// Executes pipeline trees durably.
pub struct PipelineExecutor {
    persistence: Arc<dyn Persistence>,
    registry: Arc<ExecutorRegistry>,
    notifier: Option<Arc<dyn Notifier>>,
    permits: Arc<Semaphore>,
    todo_policy: TodoPolicy,
    active: StdMutex<HashMap<String, CancellationToken>>,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("registry", &self.registry)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

/// In-flight state of one run.
struct RunHandle {
    run_id: String,
    root: SubProcess,
    context: SharedContext,
    nodes: StdMutex<BTreeMap<NodeId, NodeRecord>>,
    cancel: CancellationToken,
    created_at: DateTime<Utc>,
    checkpoint_lock: Mutex<()>,
    checkpoint_error: StdMutex<Option<CoreError>>,
}

impl RunHandle {
    fn new(state: RunState, cancel: CancellationToken) -> Self {
        Self {
            run_id: state.run_id,
            root: state.root,
            context: SharedContext::new(state.context),
            nodes: StdMutex::new(state.nodes),
            cancel,
            created_at: state.created_at,
            checkpoint_lock: Mutex::new(()),
            checkpoint_error: StdMutex::new(None),
        }
    }

    fn checkpoint_error(&self) -> Option<CoreError> {
        self.checkpoint_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn status_of(&self, id: &NodeId) -> NodeStatus {
        let nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        nodes.get(id).map(|r| r.status).unwrap_or_default()
    }

    fn update(&self, id: &NodeId, f: impl FnOnce(&mut NodeRecord)) {
        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        f(nodes.entry(id.clone()).or_default());
    }

    fn finish(&self, id: &NodeId, status: NodeStatus, log: Option<&str>) {
        self.update(id, |r| {
            r.status = status;
            r.finished_at = Some(Utc::now());
            if let Some(line) = log {
                r.push_log(line);
            }
        });
    }

    /// Mark a new attempt and return its 1-indexed number.
    fn begin_attempt(&self, id: &NodeId) -> u32 {
        let mut nodes = self.nodes.lock().unwrap_or_else(PoisonError::into_inner);
        let record = nodes.entry(id.clone()).or_default();
        record.status = NodeStatus::Running;
        record.attempts += 1;
        record.started_at = Some(Utc::now());
        record.finished_at = None;
        record.attempts
    }

    fn snapshot(&self, status: RunStatus) -> RunState {
        let nodes = self
            .nodes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut state = RunState {
            run_id: self.run_id.clone(),
            status,
            root: self.root.clone(),
            context: self.context.snapshot(),
            nodes,
            resume_pointer: None,
            created_at: self.created_at,
            updated_at: Utc::now(),
        };
        state.refresh_resume_pointer();
        state
    }
}

/// Exclusive hold on a run within one executor; released on drop.
struct RunClaim<'a> {
    active: &'a StdMutex<HashMap<String, CancellationToken>>,
    run_id: String,
    cancel: CancellationToken,
}

impl Drop for RunClaim<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.run_id);
    }
}

impl PipelineExecutor {
    /// Create a builder.
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    /// Start a new run of `root`.
    #[instrument(skip(self, root, context))]
    pub async fn run(
        &self,
        run_id: &str,
        root: SubProcess,
        context: ExecutionContext,
    ) -> Result<RunResult> {
        root.validate(&self.registry)?;
        let claim = self.claim(run_id)?;
        if self.persistence.load_run(run_id).await?.is_some() {
            return Err(CoreError::RunAlreadyExists {
                run_id: run_id.to_string(),
            });
        }

        let state = RunState::new(run_id, root, context);
        self.persistence.save_run(&state).await?;
        info!(nodes = state.nodes.len(), "Starting run");
        self.drive(claim, state).await
    }

    /// Re-enter a paused run after its confirmation was given.
    ///
    /// Fails while every pause node of the run is still waiting. A run left
    /// RUNNING by a process that died is picked up again from its last
    /// checkpoint; the activity that was in flight is dispatched again.
    #[instrument(skip(self))]
    pub async fn resume(&self, run_id: &str) -> Result<RunResult> {
        let claim = self.claim(run_id)?;
        let mut state = self.load(run_id).await?;
        match state.status {
            RunStatus::Paused => {
                let settled = self.settle_pauses(&mut state).await?;
                if settled == 0 {
                    let waiting = state.paused_nodes();
                    return Err(CoreError::InvalidNodeState {
                        run_id: run_id.to_string(),
                        node_id: waiting
                            .first()
                            .map(|id| id.to_string())
                            .unwrap_or_default(),
                        expected: "approved".to_string(),
                        actual: NodeStatus::Paused.as_str().to_string(),
                    });
                }
                info!(settled, "Resuming run");
            }
            RunStatus::Running => {
                info!("Recovering interrupted run");
            }
            other => {
                return Err(CoreError::InvalidRunState {
                    run_id: run_id.to_string(),
                    expected: RunStatus::Paused.as_str().to_string(),
                    actual: other.as_str().to_string(),
                });
            }
        }

        state.status = RunStatus::Running;
        self.drive(claim, state).await
    }

    /// Re-run a failed node and its subtree.
    ///
    /// Succeeded nodes elsewhere are skipped; other failed nodes stay failed.
    #[instrument(skip(self))]
    pub async fn retry_node(&self, run_id: &str, node_id: &NodeId) -> Result<RunResult> {
        let claim = self.claim(run_id)?;
        let mut state = self.load(run_id).await?;
        if state.status != RunStatus::Failed {
            return Err(CoreError::InvalidRunState {
                run_id: run_id.to_string(),
                expected: RunStatus::Failed.as_str().to_string(),
                actual: state.status.as_str().to_string(),
            });
        }

        let path = state
            .root
            .path_to(node_id)
            .ok_or_else(|| CoreError::NodeNotFound {
                run_id: run_id.to_string(),
                node_id: node_id.to_string(),
            })?;
        let current = state.node_status(node_id);
        if current != NodeStatus::Failed {
            return Err(CoreError::InvalidNodeState {
                run_id: run_id.to_string(),
                node_id: node_id.to_string(),
                expected: NodeStatus::Failed.as_str().to_string(),
                actual: current.as_str().to_string(),
            });
        }

        let subtree: HashSet<NodeId> = state
            .root
            .find(node_id)
            .map(|n| n.descendant_ids().into_iter().collect())
            .unwrap_or_default();
        for id in &subtree {
            let record = state.nodes.entry(id.clone()).or_default();
            record.status = NodeStatus::Pending;
            record.todo_id = None;
            record.started_at = None;
            record.finished_at = None;
        }
        state
            .context
            .per_node_outputs
            .retain(|id, _| !subtree.contains(id));
        for ancestor in path.iter().filter(|id| !subtree.contains(*id)) {
            let record = state.nodes.entry(ancestor.clone()).or_default();
            record.status = NodeStatus::Pending;
            record.finished_at = None;
        }

        info!(reset = subtree.len(), "Retrying node");
        state.status = RunStatus::Running;
        self.drive(claim, state).await
    }

    /// Stop a run.
    ///
    /// A paused or failed run becomes CANCELLED immediately and its open todos
    /// are closed. A run executing in this process is asked to stop: nodes that
    /// have not started yet are skipped, and the pass driving it marks the run
    /// CANCELLED and closes its todos when it ends. For such a run the returned
    /// result is the last checkpoint, taken before the pass has wound down.
    #[instrument(skip(self))]
    pub async fn terminate(&self, run_id: &str) -> Result<RunResult> {
        let _claim = loop {
            if let Some(claim) = self.try_claim(run_id) {
                break claim;
            }
            if let Some(token) = self.active_token(run_id) {
                token.cancel();
                info!("Cancellation requested for running run");
                return Ok(self.load(run_id).await?.result());
            }
            // The pass ended between both lookups; claim again.
            tokio::task::yield_now().await;
        };

        let mut state = self.load(run_id).await?;
        if !matches!(state.status, RunStatus::Paused | RunStatus::Failed) {
            return Err(CoreError::InvalidRunState {
                run_id: run_id.to_string(),
                expected: "paused or failed".to_string(),
                actual: state.status.as_str().to_string(),
            });
        }

        cancel_open_nodes(&mut state);
        self.close_open_todos(run_id).await?;
        self.persistence.save_run(&state).await?;
        info!("Run cancelled");
        Ok(state.result())
    }

    /// Apply a user's action to a todo.
    ///
    /// Approving resumes the run when it is paused; terminating cancels it;
    /// delivering reassigns the todo and notifies the new processors.
    #[instrument(skip(self, action))]
    pub async fn process_todo(
        &self,
        todo_id: &str,
        username: &str,
        action: TodoAction,
    ) -> Result<TodoOutcome> {
        let mut todo = self
            .persistence
            .get_todo(todo_id)
            .await?
            .ok_or_else(|| CoreError::TodoNotFound {
                todo_id: todo_id.to_string(),
            })?;

        self.todo_policy.apply(&mut todo, username, &action)?;
        self.persistence.update_todo(&todo).await?;
        info!(run_id = %todo.run_id, status = todo.status.as_str(), "Processed todo");

        let run = match &action {
            TodoAction::Approve { .. } => Some(self.continue_after_approval(&todo.run_id).await?),
            TodoAction::Terminate { .. } => Some(self.terminate(&todo.run_id).await?),
            TodoAction::Deliver { processors, .. } => {
                self.notify(&todo, processors).await;
                None
            }
        };

        Ok(TodoOutcome { todo, run })
    }

    /// Latest persisted snapshot of a run, including per-node logs.
    pub async fn status(&self, run_id: &str) -> Result<RunState> {
        self.load(run_id).await
    }

    pub async fn list_runs(
        &self,
        status: Option<RunStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RunSummary>> {
        self.persistence.list_runs(status, limit, offset).await
    }

    pub async fn todos(&self, run_id: &str) -> Result<Vec<Todo>> {
        self.persistence.list_todos(run_id).await
    }

    /// Stop accepting activity dispatches and cancel every in-flight run.
    pub fn shutdown(&self) {
        self.permits.close();
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        for token in active.values() {
            token.cancel();
        }
    }

    async fn load(&self, run_id: &str) -> Result<RunState> {
        self.persistence
            .load_run(run_id)
            .await?
            .ok_or_else(|| CoreError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    fn try_claim(&self, run_id: &str) -> Option<RunClaim<'_>> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.contains_key(run_id) {
            return None;
        }
        let cancel = CancellationToken::new();
        active.insert(run_id.to_string(), cancel.clone());
        Some(RunClaim {
            active: &self.active,
            run_id: run_id.to_string(),
            cancel,
        })
    }

    fn claim(&self, run_id: &str) -> Result<RunClaim<'_>> {
        self.try_claim(run_id)
            .ok_or_else(|| CoreError::InvalidRunState {
                run_id: run_id.to_string(),
                expected: "idle".to_string(),
                actual: RunStatus::Running.as_str().to_string(),
            })
    }

    fn active_token(&self, run_id: &str) -> Option<CancellationToken> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
            .cloned()
    }

    /// Resume or record an approval that was just written.
    ///
    /// When another pass holds the run, that pass picks the approval up as it
    /// ends and the current snapshot is returned.
    async fn continue_after_approval(&self, run_id: &str) -> Result<RunResult> {
        let Some(claim) = self.try_claim(run_id) else {
            return Ok(self.load(run_id).await?.result());
        };
        let mut state = self.load(run_id).await?;
        let settled = self.settle_pauses(&mut state).await?;
        if settled == 0 {
            return Ok(state.result());
        }
        if state.status == RunStatus::Paused {
            info!(settled, "Resuming run");
            state.status = RunStatus::Running;
            return self.drive(claim, state).await;
        }
        // Record the approval so a later retry does not pause again.
        self.persistence.save_run(&state).await?;
        Ok(state.result())
    }

    /// Close every open todo of a run as the system user.
    ///
    /// Todos closed concurrently by someone else are left as they are.
    async fn close_open_todos(&self, run_id: &str) -> Result<()> {
        for mut todo in self.persistence.list_todos(run_id).await? {
            if !todo.is_open() {
                continue;
            }
            todo.close(TodoStatus::Terminated, self.todo_policy.system_user());
            match self.persistence.update_todo(&todo).await {
                Ok(()) | Err(CoreError::TodoAlreadyProcessed { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Mark pause nodes whose todo was approved as succeeded. Returns how many.
    async fn settle_pauses(&self, state: &mut RunState) -> Result<usize> {
        let mut settled = 0;
        for node_id in state.paused_nodes() {
            let Some(todo_id) = state.nodes.get(&node_id).and_then(|r| r.todo_id.clone()) else {
                continue;
            };
            let Some(todo) = self.persistence.get_todo(&todo_id).await? else {
                continue;
            };
            if todo.status == TodoStatus::Approved {
                let record = state.nodes.entry(node_id).or_default();
                record.status = NodeStatus::Succeeded;
                record.finished_at = todo.done_at;
                record.push_log(format!(
                    "approved by {}",
                    todo.done_by.as_deref().unwrap_or("unknown")
                ));
                settled += 1;
            }
        }
        if settled > 0 {
            state.refresh_resume_pointer();
        }
        Ok(settled)
    }

    /// Drive a claimed run until it stops.
    ///
    /// A pass that ends PAUSED is followed by another one when approvals were
    /// given while it held the run.
    async fn drive(&self, claim: RunClaim<'_>, state: RunState) -> Result<RunResult> {
        let run_id = state.run_id.clone();
        let mut claim = claim;
        let mut state = state;
        loop {
            let result = self.drive_pass(&claim, state).await?;
            let cancel = claim.cancel.clone();
            drop(claim);
            if cancel.is_cancelled() && matches!(result.status, RunStatus::Paused | RunStatus::Failed) {
                // Cancelled after the pass settled its final status.
                return match self.terminate(&run_id).await {
                    Err(CoreError::InvalidRunState { .. }) => Ok(self.load(&run_id).await?.result()),
                    other => other,
                };
            }
            if result.status != RunStatus::Paused {
                return Ok(result);
            }

            let Some(next) = self.try_claim(&run_id) else {
                return Ok(result);
            };
            let mut reloaded = self.load(&run_id).await?;
            if reloaded.status != RunStatus::Paused || self.settle_pauses(&mut reloaded).await? == 0 {
                return Ok(reloaded.result());
            }
            info!(run_id = %run_id, "Picking up approvals given during the pass");
            reloaded.status = RunStatus::Running;
            claim = next;
            state = reloaded;
        }
    }

    async fn drive_pass(&self, claim: &RunClaim<'_>, state: RunState) -> Result<RunResult> {
        let run_id = state.run_id.clone();
        let handle = RunHandle::new(state, claim.cancel.clone());
        let root_status = self.execute_subprocess(&handle, &handle.root).await;

        let mut final_state = {
            let _guard = handle.checkpoint_lock.lock().await;
            handle.snapshot(RunStatus::from(root_status))
        };
        let cancelled = claim.cancel.is_cancelled()
            && matches!(final_state.status, RunStatus::Paused | RunStatus::Failed);
        if cancelled || final_state.status == RunStatus::Cancelled {
            cancel_open_nodes(&mut final_state);
            self.close_open_todos(&run_id).await?;
        }
        self.persistence.save_run(&final_state).await?;

        if let Some(err) = handle.checkpoint_error() {
            return Err(err);
        }

        let result = final_state.result();
        info!(
            run_id = %run_id,
            status = result.status.as_str(),
            failed = result.failed_nodes.len(),
            pending_todos = result.pending_todos.len(),
            "Run pass finished"
        );
        Ok(result)
    }

    /// Persist the in-flight snapshot. A failed write halts the pass.
    async fn checkpoint(&self, run: &RunHandle) {
        let _guard = run.checkpoint_lock.lock().await;
        let state = run.snapshot(RunStatus::Running);
        if let Err(e) = self.persistence.save_run(&state).await {
            warn!(run_id = %run.run_id, error = %e, "Failed to checkpoint run, halting pass");
            run.checkpoint_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_or_insert(e);
        }
    }

    fn execute_node<'a>(&'a self, run: &'a RunHandle, node: &'a PipelineNode) -> BoxFuture<'a, NodeStatus> {
        Box::pin(async move {
            match node {
                PipelineNode::Activity(activity) => self.execute_activity(run, activity).await,
                PipelineNode::SubProcess(sub) => self.execute_subprocess(run, sub).await,
            }
        })
    }

    async fn execute_subprocess(&self, run: &RunHandle, sub: &SubProcess) -> NodeStatus {
        match run.status_of(&sub.id) {
            done @ (NodeStatus::Succeeded | NodeStatus::Failed | NodeStatus::Cancelled) => {
                return done;
            }
            NodeStatus::Pending | NodeStatus::Running | NodeStatus::Paused => {}
        }

        run.update(&sub.id, |r| {
            r.status = NodeStatus::Running;
            r.started_at.get_or_insert_with(Utc::now);
        });

        let status = match sub.fan_out {
            FanOut::Sequential => {
                let mut status = NodeStatus::Succeeded;
                for child in &sub.children {
                    let child_status = self.execute_node(run, child).await;
                    if child_status != NodeStatus::Succeeded {
                        status = child_status;
                        break;
                    }
                }
                status
            }
            FanOut::Parallel => {
                let statuses =
                    join_all(sub.children.iter().map(|child| self.execute_node(run, child))).await;
                merge_parallel(&statuses)
            }
        };

        if status == NodeStatus::Paused {
            run.update(&sub.id, |r| r.status = NodeStatus::Paused);
        } else {
            run.finish(&sub.id, status, None);
        }
        status
    }

    async fn execute_activity(&self, run: &RunHandle, activity: &Activity) -> NodeStatus {
        match run.status_of(&activity.id) {
            done @ (NodeStatus::Succeeded
            | NodeStatus::Failed
            | NodeStatus::Paused
            | NodeStatus::Cancelled) => return done,
            NodeStatus::Pending | NodeStatus::Running => {}
        }

        if run.cancel.is_cancelled() {
            run.finish(
                &activity.id,
                NodeStatus::Cancelled,
                Some("run terminated before node started"),
            );
            return NodeStatus::Cancelled;
        }
        if let Some(err) = run.checkpoint_error() {
            run.finish(
                &activity.id,
                NodeStatus::Failed,
                Some(&format!("run halted, checkpoint failed: {err}")),
            );
            return NodeStatus::Failed;
        }

        match activity.kind {
            ActivityKind::Pause => self.pause_at(run, activity).await,
            ActivityKind::Task => self.dispatch(run, activity).await,
        }
    }

    async fn pause_at(&self, run: &RunHandle, activity: &Activity) -> NodeStatus {
        let operators = string_list(activity.kwargs.get("operators"))
            .or_else(|| string_list(run.context.global("operators").as_ref()))
            .unwrap_or_default();
        let helpers = string_list(activity.kwargs.get("helpers")).unwrap_or_default();

        let mut todo = Todo::new(
            run.run_id.clone(),
            activity.id.clone(),
            activity.name.clone(),
            operators,
            helpers,
        );
        todo.context = activity.kwargs.clone();

        if let Err(e) = self.persistence.insert_todo(&todo).await {
            warn!(run_id = %run.run_id, node_id = %activity.id, error = %e, "Failed to create todo");
            run.finish(
                &activity.id,
                NodeStatus::Failed,
                Some(&format!("failed to create todo: {e}")),
            );
            self.checkpoint(run).await;
            return NodeStatus::Failed;
        }

        run.update(&activity.id, |r| {
            r.status = NodeStatus::Paused;
            r.todo_id = Some(todo.id.clone());
            r.started_at = Some(Utc::now());
            r.push_log(format!("waiting for confirmation, todo {}", todo.id));
        });
        info!(
            run_id = %run.run_id,
            node_id = %activity.id,
            todo_id = %todo.id,
            "Run paused for confirmation"
        );

        self.notify(&todo, &todo.recipients()).await;
        self.checkpoint(run).await;
        NodeStatus::Paused
    }

    async fn dispatch(&self, run: &RunHandle, activity: &Activity) -> NodeStatus {
        let id = &activity.id;
        let Some(executor) = self.registry.get(&activity.executor) else {
            let line = format!("no executor registered under '{}'", activity.executor);
            run.finish(id, NodeStatus::Failed, Some(&line));
            self.checkpoint(run).await;
            return NodeStatus::Failed;
        };

        let mut tries = 0u32;
        loop {
            let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                run.finish(id, NodeStatus::Failed, Some("executor is shutting down"));
                self.checkpoint(run).await;
                return NodeStatus::Failed;
            };

            tries += 1;
            let attempt = run.begin_attempt(id);
            let input = ActivityInput {
                run_id: run.run_id.clone(),
                node_id: id.clone(),
                name: activity.name.clone(),
                kwargs: activity.kwargs.clone(),
                attempt,
                context: run.context.clone(),
            };
            debug!(run_id = %run.run_id, node_id = %id, executor = %activity.executor, attempt, "Dispatching activity");

            let executor = Arc::clone(&executor);
            let joined = tokio::spawn(async move { executor.execute(input).await }).await;
            drop(permit);

            let failure = match joined {
                Ok(Ok(outcome)) => {
                    run.context.write_outputs(id, outcome.outputs);
                    if outcome.success {
                        run.finish(id, NodeStatus::Succeeded, Some(&outcome.log));
                        self.checkpoint(run).await;
                        return NodeStatus::Succeeded;
                    }
                    if outcome.log.is_empty() {
                        "executor reported failure".to_string()
                    } else {
                        outcome.log
                    }
                }
                Ok(Err(err)) => err.to_string(),
                Err(join_err) => describe_join_error(join_err),
            };

            warn!(
                run_id = %run.run_id,
                node_id = %id,
                attempt,
                error = %failure,
                "Activity attempt failed"
            );
            run.update(id, |r| r.push_log(&failure));

            if activity.retry.allows_another(tries) && !run.cancel.is_cancelled() {
                tokio::time::sleep(activity.retry.delay_after(tries)).await;
                continue;
            }

            let exhausted = matches!(activity.retry, RetryPolicy::Auto { .. })
                .then(|| format!("retry exhausted after {tries} attempts"));
            run.finish(id, NodeStatus::Failed, exhausted.as_deref());
            self.checkpoint(run).await;
            return NodeStatus::Failed;
        }
    }

    async fn notify(&self, todo: &Todo, recipients: &[String]) {
        if let Some(notifier) = &self.notifier
            && let Err(e) = notifier.notify_todo(todo, recipients).await
        {
            warn!(todo_id = %todo.id, error = %e, "Failed to deliver todo notification");
        }
    }
}

/// Mark the run CANCELLED along with every node that has not finished.
fn cancel_open_nodes(state: &mut RunState) {
    let now = Utc::now();
    for record in state.nodes.values_mut() {
        if matches!(
            record.status,
            NodeStatus::Pending | NodeStatus::Running | NodeStatus::Paused
        ) {
            record.status = NodeStatus::Cancelled;
            record.finished_at = Some(now);
        }
    }
    state.status = RunStatus::Cancelled;
    state.resume_pointer = None;
    state.updated_at = now;
}

/// Status of a parallel scope once every child has finished.
fn merge_parallel(statuses: &[NodeStatus]) -> NodeStatus {
    if statuses.contains(&NodeStatus::Failed) {
        NodeStatus::Failed
    } else if statuses.contains(&NodeStatus::Cancelled) {
        NodeStatus::Cancelled
    } else if statuses.contains(&NodeStatus::Paused) {
        NodeStatus::Paused
    } else {
        NodeStatus::Succeeded
    }
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
    )
}

fn describe_join_error(err: tokio::task::JoinError) -> String {
    if err.is_panic() {
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        format!("executor panicked: {message}")
    } else {
        format!("executor task was cancelled: {err}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_parallel_precedence() {
        use NodeStatus::*;
        assert_eq!(merge_parallel(&[Succeeded, Failed, Paused]), Failed);
        assert_eq!(merge_parallel(&[Succeeded, Cancelled, Paused]), Cancelled);
        assert_eq!(merge_parallel(&[Succeeded, Paused]), Paused);
        assert_eq!(merge_parallel(&[]), Succeeded);
    }

    #[test]
    fn test_string_list() {
        let v = serde_json::json!(["a", 1, "b"]);
        assert_eq!(string_list(Some(&v)), Some(vec!["a".into(), "b".into()]));
        assert_eq!(string_list(Some(&serde_json::json!("a"))), None);
        assert_eq!(string_list(None), None);
    }

    #[test]
    fn test_builder_requires_persistence() {
        let err = PipelineExecutor::builder()
            .registry(Arc::new(ExecutorRegistry::new()))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("persistence"));
    }
}
