// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rule driver.
//!
//! [`TopologyChecker`] loads one snapshot per cluster, runs the rule set for
//! its cluster type in order and concatenates the findings. A rule that
//! panics is reported as a finding of its own; the remaining rules still run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, TopologyError};
use crate::finding::{CheckFinding, CheckSubType};
use crate::graph::ClusterGraph;
use crate::rules::{Rule, RuleCatalog};
use crate::source::{GraphSource, InspectionReport, ReportSink};

/// Outcome of an inspection sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionSummary {
    pub checked: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub findings: usize,
    /// Clusters that could not be checked or reported, with the reason.
    pub failed: Vec<(u64, String)>,
}

pub struct TopologyChecker {
    source: Arc<dyn GraphSource>,
    catalog: RuleCatalog,
}

impl std::fmt::Debug for TopologyChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyChecker")
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

impl TopologyChecker {
    pub fn new(source: Arc<dyn GraphSource>, catalog: RuleCatalog) -> Self {
        Self { source, catalog }
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    /// Load a cluster and run its rule set.
    ///
    /// Fails only when the cluster cannot be loaded.
    #[instrument(skip(self))]
    pub async fn run_checks(&self, cluster_id: u64) -> Result<Vec<CheckFinding>> {
        let graph = self
            .source
            .load_cluster(cluster_id)
            .await?
            .ok_or(TopologyError::ClusterNotFound { cluster_id })?;
        Ok(self.check_graph(&graph))
    }

    /// Run the rule set for an already loaded graph.
    pub fn check_graph(&self, graph: &ClusterGraph) -> Vec<CheckFinding> {
        let Some(set) = self.catalog.get(graph.cluster_type) else {
            debug!(
                cluster_id = graph.cluster_id,
                cluster_type = %graph.cluster_type,
                "No topology rules for cluster type"
            );
            return Vec::new();
        };

        let mut findings = Vec::new();
        for rule in set.rules() {
            findings.extend(run_rule(rule, graph));
        }
        debug!(
            cluster_id = graph.cluster_id,
            rules = set.len(),
            findings = findings.len(),
            "Topology checked"
        );
        findings
    }

    /// Check every listed cluster and hand each report to `sink`.
    ///
    /// A cluster that fails to load or report is logged and counted in
    /// [`InspectionSummary::failed`]; the sweep carries on.
    #[instrument(skip(self, cluster_ids, sink))]
    pub async fn inspect(&self, cluster_ids: &[u64], sink: &dyn ReportSink) -> InspectionSummary {
        let mut summary = InspectionSummary::default();

        for &cluster_id in cluster_ids {
            let graph = match self.source.load_cluster(cluster_id).await {
                Ok(Some(graph)) => graph,
                Ok(None) => {
                    let err = TopologyError::ClusterNotFound { cluster_id };
                    warn!(cluster_id, error = %err, "Skipping cluster");
                    summary.failed.push((cluster_id, err.to_string()));
                    continue;
                }
                Err(e) => {
                    warn!(cluster_id, error = %e, "Failed to load cluster");
                    summary.failed.push((cluster_id, e.to_string()));
                    continue;
                }
            };

            let report = InspectionReport {
                cluster_id,
                bk_biz_id: graph.bk_biz_id,
                cluster_type: graph.cluster_type,
                findings: self.check_graph(&graph),
                checked_at: Utc::now(),
            };

            if let Err(e) = sink.record(&report).await {
                warn!(cluster_id, error = %e, "Failed to record inspection report");
                summary.failed.push((cluster_id, e.to_string()));
                continue;
            }

            summary.checked += 1;
            summary.findings += report.findings.len();
            if report.is_healthy() {
                summary.healthy += 1;
            } else {
                summary.unhealthy += 1;
            }
        }

        info!(
            checked = summary.checked,
            unhealthy = summary.unhealthy,
            failed = summary.failed.len(),
            "Inspection finished"
        );
        summary
    }
}

fn run_rule(rule: &Rule, graph: &ClusterGraph) -> Vec<CheckFinding> {
    match catch_unwind(AssertUnwindSafe(|| (rule.check)(graph))) {
        Ok(findings) => findings
            .into_iter()
            .map(|mut f| {
                f.rule = rule.name.to_string();
                f.category = rule.category;
                f
            })
            .collect(),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            warn!(
                cluster_id = graph.cluster_id,
                rule = rule.name,
                error = %message,
                "Topology rule crashed"
            );
            vec![CheckFinding {
                rule: rule.name.to_string(),
                category: rule.category,
                subtype: CheckSubType::RuleFailure,
                message: format!("rule crashed: {message}"),
                instance: None,
            }]
        }
    }
}
