// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run-scoped shared state.
//!
//! Global parameters are fixed when the run starts. Every activity writes only
//! into its own output slot, so concurrently running siblings never touch the
//! same key; reads of globals and of other nodes' outputs are always allowed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::node::NodeId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    #[serde(default)]
    pub global_params: Map<String, Value>,
    #[serde(default)]
    pub per_node_outputs: BTreeMap<NodeId, Map<String, Value>>,
}

impl ExecutionContext {
    pub fn new(global_params: Map<String, Value>) -> Self {
        Self {
            global_params,
            per_node_outputs: BTreeMap::new(),
        }
    }

    /// Build from any serializable value that serializes to a JSON object.
    pub fn from_params<T: Serialize>(params: &T) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(params)?;
        let global_params = match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("params".to_string(), other);
                map
            }
        };
        Ok(Self::new(global_params))
    }
}

/// Cloneable handle to a run's [`ExecutionContext`].
#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    inner: Arc<RwLock<ExecutionContext>>,
}

impl SharedContext {
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            inner: Arc::new(RwLock::new(context)),
        }
    }

    pub fn global(&self, key: &str) -> Option<Value> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.global_params.get(key).cloned()
    }

    pub fn globals(&self) -> Map<String, Value> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.global_params.clone()
    }

    /// One value from a node's output slot.
    pub fn output(&self, node: &NodeId, key: &str) -> Option<Value> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.per_node_outputs.get(node)?.get(key).cloned()
    }

    /// The whole output slot of a node.
    pub fn outputs_of(&self, node: &NodeId) -> Option<Map<String, Value>> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.per_node_outputs.get(node).cloned()
    }

    /// Merge `outputs` into the writer's own slot.
    pub fn write_outputs(&self, node: &NodeId, outputs: Map<String, Value>) {
        if outputs.is_empty() {
            return;
        }
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard
            .per_node_outputs
            .entry(node.clone())
            .or_default()
            .extend(outputs);
    }

    /// Drop the output slots of the given nodes.
    pub fn clear_outputs<'a>(&self, nodes: impl IntoIterator<Item = &'a NodeId>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for node in nodes {
            guard.per_node_outputs.remove(node);
        }
    }

    pub fn snapshot(&self) -> ExecutionContext {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
