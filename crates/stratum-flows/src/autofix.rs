// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Auto-fix: turn unhealthy inspection reports into standardization tickets.
//!
//! The flow never standardizes anything itself. It spawns one follow-up
//! ticket per business and cluster type through the ticket service; the
//! ticket carries a complete [`StandardizeRequest`] as its details.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use stratum_pipeline::{ActivitySpec, ExecutorRegistry, PipelineBuilder, SubProcess};
use stratum_topology::{ClusterType, InspectionReport};

use crate::error::{FlowError, Result};
use crate::keys::{ActivityKey, TicketType};
use crate::kwargs::SpawnTicketKwargs;
use crate::standardize::StandardizeRequest;

/// One standardization request per `(bk_biz_id, cluster_type)` covering every
/// unhealthy cluster. Cluster types without a standardization flow are skipped.
pub fn standardize_requests(reports: &[InspectionReport]) -> Vec<StandardizeRequest> {
    let mut grouped: BTreeMap<(u64, ClusterType), Vec<u64>> = BTreeMap::new();
    for report in reports {
        if report.is_healthy() || report.cluster_type == ClusterType::Other {
            continue;
        }
        let ids = grouped
            .entry((report.bk_biz_id, report.cluster_type))
            .or_default();
        if !ids.contains(&report.cluster_id) {
            ids.push(report.cluster_id);
        }
    }
    grouped
        .into_iter()
        .map(|((bk_biz_id, cluster_type), mut cluster_ids)| {
            cluster_ids.sort_unstable();
            StandardizeRequest::new(bk_biz_id, cluster_type, cluster_ids)
        })
        .collect()
}

/// Build a tree that spawns one ticket per request, all in parallel.
pub fn autofix_pipeline(
    run_id: &str,
    registry: Arc<ExecutorRegistry>,
    requests: &[StandardizeRequest],
    creator: &str,
    remark: &str,
) -> Result<SubProcess> {
    if requests.is_empty() {
        return Err(FlowError::EmptyRequest);
    }

    let specs = requests
        .iter()
        .map(|request| -> Result<ActivitySpec> {
            let details = serde_json::to_value(request)?;
            Ok(ActivitySpec::new(
                format!(
                    "spawn {} standardize ticket for biz {}",
                    request.cluster_type, request.bk_biz_id
                ),
                ActivityKey::SpawnTicket,
            )
            .kwargs(&SpawnTicketKwargs {
                ticket_type: TicketType::MysqlClusterStandardize,
                bk_biz_id: request.bk_biz_id,
                creator: creator.to_string(),
                remark: remark.to_string(),
                details,
            }))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut root = PipelineBuilder::new(run_id, registry);
    root.add_parallel_activities(specs)?;
    info!(run_id, tickets = requests.len(), "Planned auto-fix");
    Ok(root.build("cluster standardize autofix")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stratum_topology::CheckFinding;

    fn report(cluster_id: u64, bk_biz_id: u64, cluster_type: ClusterType, bad: bool) -> InspectionReport {
        InspectionReport {
            cluster_id,
            bk_biz_id,
            cluster_type,
            findings: if bad {
                vec![CheckFinding::cluster("cluster status is abnormal")]
            } else {
                Vec::new()
            },
            checked_at: Utc::now(),
        }
    }

    #[test]
    fn test_requests_group_unhealthy_clusters() {
        let reports = vec![
            report(3, 1, ClusterType::TenDBHA, true),
            report(1, 1, ClusterType::TenDBHA, true),
            report(2, 1, ClusterType::TenDBHA, false),
            report(4, 1, ClusterType::TenDBCluster, true),
            report(5, 2, ClusterType::TenDBHA, true),
            report(6, 2, ClusterType::Other, true),
        ];
        let requests = standardize_requests(&reports);

        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].cluster_type, ClusterType::TenDBHA);
        assert_eq!(requests[0].cluster_ids, vec![1, 3]);
        assert_eq!(requests[1].cluster_type, ClusterType::TenDBCluster);
        assert_eq!(requests[2].bk_biz_id, 2);
    }

    #[test]
    fn test_healthy_fleet_needs_no_tickets() {
        assert!(standardize_requests(&[report(1, 1, ClusterType::TenDBHA, false)]).is_empty());
    }
}
