// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::HashSet;

use crate::finding::{CheckFinding, CheckSubType, InstanceRef};
use crate::graph::ClusterGraph;

/// Every instance is listed once and belongs to this cluster only.
pub fn unique_membership(g: &ClusterGraph) -> Vec<CheckFinding> {
    let mut bad = Vec::new();
    let mut seen = HashSet::new();

    let instances = g
        .proxies
        .iter()
        .map(|p| (InstanceRef::from(p), &p.cluster_ids))
        .chain(g.storages.iter().map(|s| (InstanceRef::from(s), &s.cluster_ids)));

    for (instance, cluster_ids) in instances {
        if !seen.insert((instance.kind, instance.id)) {
            bad.push(CheckFinding::instance("instance listed more than once", instance));
            continue;
        }
        let message = match cluster_ids.as_slice() {
            [] => "instance is not attached to any cluster".to_string(),
            [only] if *only == g.cluster_id => continue,
            [other] => format!("instance belongs to cluster {other}"),
            many => format!(
                "instance belongs to {} clusters: {}",
                many.len(),
                many.iter().map(u64::to_string).collect::<Vec<_>>().join(",")
            ),
        };
        bad.push(
            CheckFinding::instance(message, instance).with_subtype(CheckSubType::UniqueCluster),
        );
    }

    bad
}
