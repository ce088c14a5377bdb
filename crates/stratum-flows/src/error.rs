// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Errors raised while planning a flow.

use stratum_pipeline::BuildError;
use stratum_topology::{CheckFinding, ClusterType, TopologyError};

pub type Result<T> = std::result::Result<T, FlowError>;

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("cluster {cluster_id} not found")]
    ClusterNotFound { cluster_id: u64 },

    #[error("cluster {cluster_id} is {actual}, request is for {expected}")]
    ClusterTypeMismatch {
        cluster_id: u64,
        expected: ClusterType,
        actual: ClusterType,
    },

    #[error("proxy {ip} does not serve cluster {cluster_id}")]
    ProxyNotInCluster { ip: String, cluster_id: u64 },

    #[error("cluster {cluster_id} would keep {remaining} proxies, at least {required} required")]
    NotEnoughProxies {
        cluster_id: u64,
        remaining: usize,
        required: usize,
    },

    #[error("request names no cluster")]
    EmptyRequest,

    #[error("pre-flight topology check failed for clusters {clusters:?}: {} finding(s)", findings.len())]
    PreflightFailed {
        clusters: Vec<u64>,
        findings: Vec<CheckFinding>,
    },

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("invalid flow parameters: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Build(_) => "BUILD_ERROR",
            Self::ClusterNotFound { .. } => "CLUSTER_NOT_FOUND",
            Self::ClusterTypeMismatch { .. } => "CLUSTER_TYPE_MISMATCH",
            Self::ProxyNotInCluster { .. } => "PROXY_NOT_IN_CLUSTER",
            Self::NotEnoughProxies { .. } => "NOT_ENOUGH_PROXIES",
            Self::EmptyRequest => "EMPTY_REQUEST",
            Self::PreflightFailed { .. } => "PREFLIGHT_FAILED",
            Self::Topology(e) => e.error_code(),
            Self::Json(_) => "INVALID_PARAMS",
        }
    }
}
