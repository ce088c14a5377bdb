// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Where graphs come from and where reports go.
//!
//! The metadata store and the report viewer are external; the checker only
//! needs [`GraphSource`] to load a fully populated snapshot in one call and
//! [`ReportSink`] to hand findings over.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Result, TopologyError};
use crate::finding::CheckFinding;
use crate::graph::{ClusterGraph, ClusterType};

/// Loads cluster snapshots.
#[async_trait]
pub trait GraphSource: Send + Sync {
    /// Load one cluster with all relationships materialized.
    ///
    /// Returns `None` if the cluster does not exist.
    async fn load_cluster(&self, cluster_id: u64) -> Result<Option<ClusterGraph>>;
}

/// Graphs held in memory, e.g. parsed from a JSON document.
#[derive(Debug, Default)]
pub struct MemoryGraphSource {
    graphs: RwLock<BTreeMap<u64, ClusterGraph>>,
}

impl MemoryGraphSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_graphs(graphs: impl IntoIterator<Item = ClusterGraph>) -> Self {
        Self {
            graphs: RwLock::new(graphs.into_iter().map(|g| (g.cluster_id, g)).collect()),
        }
    }

    /// Parse a JSON array of graphs.
    pub fn from_json(json: &str) -> Result<Self> {
        let graphs: Vec<ClusterGraph> = serde_json::from_str(json)?;
        Ok(Self::from_graphs(graphs))
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| TopologyError::Source(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_json(&text)
    }

    /// Insert or replace a graph.
    pub async fn put(&self, graph: ClusterGraph) {
        self.graphs.write().await.insert(graph.cluster_id, graph);
    }

    pub async fn cluster_ids(&self) -> Vec<u64> {
        self.graphs.read().await.keys().copied().collect()
    }
}

#[async_trait]
impl GraphSource for MemoryGraphSource {
    async fn load_cluster(&self, cluster_id: u64) -> Result<Option<ClusterGraph>> {
        Ok(self.graphs.read().await.get(&cluster_id).cloned())
    }
}

/// Findings for one cluster from one inspection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionReport {
    pub cluster_id: u64,
    pub bk_biz_id: u64,
    pub cluster_type: ClusterType,
    pub findings: Vec<CheckFinding>,
    pub checked_at: DateTime<Utc>,
}

impl InspectionReport {
    pub fn is_healthy(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Receives inspection reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn record(&self, report: &InspectionReport) -> Result<()>;
}

/// Sink that keeps every report, for tests and the CLI.
#[derive(Debug, Default)]
pub struct MemoryReportSink {
    reports: RwLock<Vec<InspectionReport>>,
}

impl MemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reports(&self) -> Vec<InspectionReport> {
        self.reports.read().await.clone()
    }
}

#[async_trait]
impl ReportSink for MemoryReportSink {
    async fn record(&self, report: &InspectionReport) -> Result<()> {
        self.reports.write().await.push(report.clone());
        Ok(())
    }
}
