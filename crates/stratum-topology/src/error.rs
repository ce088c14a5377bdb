// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Topology error types.
//!
//! Violations are reported as findings; these errors cover infrastructure
//! problems only.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("cluster {cluster_id} not found")]
    ClusterNotFound { cluster_id: u64 },

    #[error("graph source error: {0}")]
    Source(String),

    #[error("report sink error: {0}")]
    Sink(String),

    #[error("invalid graph document: {0}")]
    Json(#[from] serde_json::Error),
}

impl TopologyError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ClusterNotFound { .. } => "CLUSTER_NOT_FOUND",
            Self::Source(_) => "SOURCE_ERROR",
            Self::Sink(_) => "SINK_ERROR",
            Self::Json(_) => "INVALID_GRAPH",
        }
    }
}

pub type Result<T> = std::result::Result<T, TopologyError>;
