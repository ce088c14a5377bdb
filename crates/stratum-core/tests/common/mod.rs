// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for stratum-core tests.
//!
//! Provides a [`Harness`] with a registry of scripted executors that record
//! every dispatch, plus helpers to build executors over shared persistence.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use stratum_core::persistence::{MemoryPersistence, Persistence};
use stratum_core::{Notifier, NotifyError, PipelineExecutor, RunResult, Todo};
use stratum_pipeline::{
    ActivityError, ActivityExecutor, ActivityInput, ActivityOutcome, ExecutorRegistry, NodeId,
    SubProcess,
};

/// Tracks how many slow activities run at once.
#[derive(Default)]
pub struct Concurrency {
    pub current: AtomicUsize,
    pub max: AtomicUsize,
}

struct SlowExecutor {
    concurrency: Arc<Concurrency>,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ActivityExecutor for SlowExecutor {
    async fn execute(&self, input: ActivityInput) -> Result<ActivityOutcome, ActivityError> {
        let now = self.concurrency.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.concurrency.max.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.concurrency.current.fetch_sub(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(input.name.clone());
        Ok(ActivityOutcome::succeeded())
    }
}

/// Blocks until the test adds a permit to `release`.
struct HoldExecutor {
    release: Arc<Semaphore>,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ActivityExecutor for HoldExecutor {
    async fn execute(&self, input: ActivityInput) -> Result<ActivityOutcome, ActivityError> {
        self.release
            .acquire()
            .await
            .map_err(|e| ActivityError::Other(e.to_string()))?
            .forget();
        self.log.lock().unwrap().push(input.name.clone());
        Ok(ActivityOutcome::succeeded())
    }
}

/// Scripted executors and a shared dispatch log.
pub struct Harness {
    pub registry: Arc<ExecutorRegistry>,
    pub log: Arc<Mutex<Vec<String>>>,
    pub concurrency: Arc<Concurrency>,
    /// While false, `toggle` activities fail.
    pub healthy: Arc<AtomicBool>,
    /// Each permit lets one `hold` activity finish.
    pub release: Arc<Semaphore>,
}

impl Harness {
    pub fn new() -> Self {
        let log = Arc::new(Mutex::new(Vec::new()));
        let concurrency = Arc::new(Concurrency::default());
        let healthy = Arc::new(AtomicBool::new(false));
        let release = Arc::new(Semaphore::new(0));
        let mut registry = ExecutorRegistry::new();

        // Writes `value` from kwargs; copies the `value` output of the node
        // named by `read_from`, and the global named by `global`.
        let l = log.clone();
        registry.register_fn("record", move |input| {
            l.lock().unwrap().push(input.name.clone());
            let mut outcome = ActivityOutcome::succeeded()
                .with_output("value", input.kwargs.get("value").cloned().unwrap_or(Value::Null));
            if let Some(from) = input.kwargs.get("read_from").and_then(Value::as_str) {
                let seen = input
                    .context
                    .output(&NodeId::from(from), "value")
                    .unwrap_or(Value::Null);
                outcome = outcome.with_output("seen", seen);
            }
            if let Some(key) = input.kwargs.get("global").and_then(Value::as_str) {
                outcome = outcome.with_output("global", input.context.global(key).unwrap_or(Value::Null));
            }
            Ok(outcome)
        });

        let l = log.clone();
        registry.register_fn("fail", move |input| {
            l.lock().unwrap().push(input.name.clone());
            Ok(ActivityOutcome::failed("boom").with_output("attempted", true))
        });

        let l = log.clone();
        registry.register_fn("error", move |input| {
            l.lock().unwrap().push(input.name.clone());
            Err(ActivityError::Other("exploded".to_string()))
        });

        let l = log.clone();
        registry.register_fn("panic", move |input| {
            l.lock().unwrap().push(input.name.clone());
            panic!("kaboom");
        });

        // Fails until the attempt number reaches `succeed_on`.
        let l = log.clone();
        registry.register_fn("flaky", move |input| {
            l.lock().unwrap().push(input.name.clone());
            let succeed_on = input
                .kwargs
                .get("succeed_on")
                .and_then(Value::as_u64)
                .unwrap_or(1);
            if u64::from(input.attempt) >= succeed_on {
                Ok(ActivityOutcome::succeeded().with_output("attempt", input.attempt))
            } else {
                Ok(ActivityOutcome::failed(format!("attempt {} failed", input.attempt)))
            }
        });

        let l = log.clone();
        let h = healthy.clone();
        registry.register_fn("toggle", move |input| {
            l.lock().unwrap().push(input.name.clone());
            if h.load(Ordering::SeqCst) {
                Ok(ActivityOutcome::succeeded().with_output("value", json!("fixed")))
            } else {
                Ok(ActivityOutcome::failed("remote host unreachable"))
            }
        });

        registry.register(
            "slow",
            Arc::new(SlowExecutor {
                concurrency: concurrency.clone(),
                log: log.clone(),
            }),
        );

        registry.register(
            "hold",
            Arc::new(HoldExecutor {
                release: release.clone(),
                log: log.clone(),
            }),
        );

        Self {
            registry: Arc::new(registry),
            log,
            concurrency,
            healthy,
            release,
        }
    }

    pub fn executor(&self, persistence: Arc<dyn Persistence>) -> PipelineExecutor {
        self.executor_with(persistence, 16)
    }

    pub fn executor_with(
        &self,
        persistence: Arc<dyn Persistence>,
        max_parallelism: usize,
    ) -> PipelineExecutor {
        PipelineExecutor::builder()
            .persistence(persistence)
            .registry(self.registry.clone())
            .max_parallelism(max_parallelism)
            .build()
            .expect("executor should build")
    }

    pub fn memory_executor(&self) -> PipelineExecutor {
        self.executor(Arc::new(MemoryPersistence::new()))
    }

    pub fn dispatched(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|n| *n == name).count()
    }
}

/// Per-node outputs keyed by activity name instead of node id.
pub fn outputs_by_name(tree: &SubProcess, result: &RunResult) -> BTreeMap<String, Map<String, Value>> {
    tree.activities()
        .into_iter()
        .filter_map(|a| {
            result
                .per_node_outputs
                .get(&a.id)
                .map(|out| (a.name.clone(), out.clone()))
        })
        .collect()
}

/// Id of the activity with the given name.
pub fn node_named(tree: &SubProcess, name: &str) -> NodeId {
    tree.activities()
        .into_iter()
        .find(|a| a.name == name)
        .map(|a| a.id.clone())
        .unwrap_or_else(|| panic!("no activity named {name}"))
}

/// Wait until the run has an open todo and return its id.
pub async fn open_todo(executor: &PipelineExecutor, run_id: &str) -> String {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let todos = executor.todos(run_id).await.unwrap_or_default();
            if let Some(todo) = todos.into_iter().find(|t| t.is_open()) {
                return todo.id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("run should open a todo")
}

/// Notifier that remembers every notification.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, Vec<String>)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_todo(&self, todo: &Todo, recipients: &[String]) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((todo.id.clone(), recipients.to_vec()));
        Ok(())
    }
}
