// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Errors raised while assembling a pipeline tree.

use crate::node::NodeId;
use crate::registry::ExecutorKey;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The builder was already sealed by `build`.
    #[error("builder for run '{run_id}' is sealed")]
    Sealed { run_id: String },

    /// An activity names an executor key that is not registered.
    #[error("activity '{node}' references unknown executor '{key}'")]
    UnknownExecutor { key: ExecutorKey, node: String },

    /// Activity kwargs did not serialize to a JSON object.
    #[error("activity '{node}' has invalid kwargs: {reason}")]
    InvalidKwargs { node: String, reason: String },

    /// Two nodes in the same tree share an id.
    #[error("node id '{0}' is used more than once")]
    DuplicateNodeId(NodeId),
}
