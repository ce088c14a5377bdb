// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Executor contract and the registry that binds executor keys to code.
//!
//! The registry is an explicit value handed to the builder and the executor.
//! There is no process-wide table; two registries can coexist in one process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::SharedContext;
use crate::node::NodeId;

/// Key under which an executor is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutorKey(String);

impl ExecutorKey {
    /// Key carried by pause activities; never looked up in a registry.
    pub const PAUSE: &'static str = "pause";

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutorKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ExecutorKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Everything an executor sees when its activity is dispatched.
#[derive(Debug, Clone)]
pub struct ActivityInput {
    pub run_id: String,
    pub node_id: NodeId,
    pub name: String,
    pub kwargs: Map<String, Value>,
    /// 1-indexed attempt number; grows with automatic and manual retries.
    pub attempt: u32,
    pub context: SharedContext,
}

impl ActivityInput {
    /// Deserialize the activity kwargs into a typed struct.
    pub fn kwargs_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, ActivityError> {
        serde_json::from_value(Value::Object(self.kwargs.clone())).map_err(|e| {
            ActivityError::InvalidKwargs {
                node: self.name.clone(),
                reason: e.to_string(),
            }
        })
    }
}

/// Result reported by an executor that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityOutcome {
    pub success: bool,
    #[serde(default)]
    pub outputs: Map<String, Value>,
    #[serde(default)]
    pub log: String,
}

impl ActivityOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(log: impl Into<String>) -> Self {
        Self {
            success: false,
            outputs: Map::new(),
            log: log.into(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = log.into();
        self
    }
}

/// Errors raised by executors instead of reporting an outcome.
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("invalid kwargs for '{node}': {reason}")]
    InvalidKwargs { node: String, reason: String },

    #[error("collaborator failed: {0}")]
    Collaborator(String),

    #[error("{0}")]
    Other(String),
}

/// Code bound to an executor key.
///
/// Implementations must be safe to re-run: a resumed or retried node may be
/// dispatched again after a partial earlier attempt.
#[async_trait]
pub trait ActivityExecutor: Send + Sync {
    async fn execute(&self, input: ActivityInput) -> Result<ActivityOutcome, ActivityError>;
}

struct FnExecutor<F>(F);

#[async_trait]
impl<F> ActivityExecutor for FnExecutor<F>
where
    F: Fn(ActivityInput) -> Result<ActivityOutcome, ActivityError> + Send + Sync,
{
    async fn execute(&self, input: ActivityInput) -> Result<ActivityOutcome, ActivityError> {
        (self.0)(input)
    }
}

/// Maps executor keys to implementations.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<ExecutorKey, Arc<dyn ActivityExecutor>>,
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.executors.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        f.debug_struct("ExecutorRegistry")
            .field("keys", &keys)
            .finish()
    }
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor, replacing any previous one under the same key.
    pub fn register(
        &mut self,
        key: impl Into<ExecutorKey>,
        executor: Arc<dyn ActivityExecutor>,
    ) -> &mut Self {
        let key = key.into();
        tracing::debug!(key = %key, "Registered activity executor");
        self.executors.insert(key, executor);
        self
    }

    /// Register a synchronous closure as an executor.
    pub fn register_fn<F>(&mut self, key: impl Into<ExecutorKey>, f: F) -> &mut Self
    where
        F: Fn(ActivityInput) -> Result<ActivityOutcome, ActivityError> + Send + Sync + 'static,
    {
        self.register(key, Arc::new(FnExecutor(f)))
    }

    pub fn get(&self, key: &ExecutorKey) -> Option<Arc<dyn ActivityExecutor>> {
        self.executors.get(key).cloned()
    }

    pub fn contains(&self, key: &ExecutorKey) -> bool {
        self.executors.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ExecutorKey> {
        self.executors.keys()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}
