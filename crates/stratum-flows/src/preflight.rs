// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Topology pre-flight check run before a flow is planned.

use tracing::{info, warn};

use stratum_topology::TopologyChecker;

use crate::error::{FlowError, Result};

/// Check every cluster and fail if any of them has findings.
///
/// All clusters are checked before failing, so the error lists every
/// unhealthy cluster at once. A cluster that cannot be loaded fails
/// immediately.
pub async fn preflight(checker: &TopologyChecker, cluster_ids: &[u64]) -> Result<()> {
    let mut unhealthy = Vec::new();
    let mut findings = Vec::new();

    for &cluster_id in cluster_ids {
        let found = checker.run_checks(cluster_id).await?;
        if !found.is_empty() {
            warn!(cluster_id, findings = found.len(), "Pre-flight check found problems");
            unhealthy.push(cluster_id);
            findings.extend(found);
        }
    }

    if unhealthy.is_empty() {
        info!(clusters = cluster_ids.len(), "Pre-flight check passed");
        return Ok(());
    }
    Err(FlowError::PreflightFailed {
        clusters: unhealthy,
        findings,
    })
}
