// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Status, cardinality and standby rules.

use crate::finding::{CheckFinding, InstanceRef};
use crate::graph::{
    ClusterGraph, ClusterStatus, EntryRole, InnerRole, InstancePhase, InstanceStatus,
};

/// Cluster status must agree with its instances.
pub fn cluster_status(g: &ClusterGraph) -> Vec<CheckFinding> {
    if g.status != ClusterStatus::Normal {
        return vec![CheckFinding::cluster(format!("cluster status is {}", g.status))];
    }

    let down = g
        .proxies
        .iter()
        .map(|p| p.status)
        .chain(g.storages.iter().map(|s| s.status))
        .filter(|s| *s != InstanceStatus::Running)
        .count();
    if down > 0 {
        return vec![CheckFinding::cluster(format!(
            "cluster status is normal but {down} instance(s) are not running"
        ))];
    }
    Vec::new()
}

/// Every instance is running.
pub fn instance_status(g: &ClusterGraph) -> Vec<CheckFinding> {
    let proxies = g
        .proxies
        .iter()
        .filter(|p| p.status != InstanceStatus::Running)
        .map(|p| (InstanceRef::from(p), p.status));
    let storages = g
        .storages
        .iter()
        .filter(|s| s.status != InstanceStatus::Running)
        .map(|s| (InstanceRef::from(s), s.status));

    proxies
        .chain(storages)
        .map(|(instance, status)| CheckFinding::instance(format!("instance is {status}"), instance))
        .collect()
}

/// At least one master entry.
pub fn master_entry_count(g: &ClusterGraph) -> Vec<CheckFinding> {
    if g.entries.iter().any(|e| e.role == EntryRole::MasterEntry) {
        Vec::new()
    } else {
        vec![CheckFinding::cluster("cluster has no master entry")]
    }
}

/// At least two healthy proxies serve the master entry.
pub fn master_proxy_count(g: &ClusterGraph) -> Vec<CheckFinding> {
    let Some(role) = g.cluster_type.master_proxy_role() else {
        return Vec::new();
    };
    let healthy = g.healthy_proxy_count(role);
    if healthy < 2 {
        vec![CheckFinding::cluster(format!(
            "only {healthy} healthy {role} instance(s), at least 2 required"
        ))]
    } else {
        Vec::new()
    }
}

/// Masters are running and online. Storages without an inner role are
/// reported here, since nothing else can tell whether they are masters.
pub fn master_status(g: &ClusterGraph) -> Vec<CheckFinding> {
    let mut bad = Vec::new();
    for s in &g.storages {
        match s.inner_role {
            None => bad.push(CheckFinding::instance("storage has no inner role", s)),
            Some(InnerRole::Master) => {
                if s.status != InstanceStatus::Running {
                    bad.push(CheckFinding::instance(format!("master is {}", s.status), s));
                } else if s.phase != InstancePhase::Online {
                    bad.push(CheckFinding::instance(format!("master is {}", s.phase), s));
                }
            }
            Some(_) => {}
        }
    }
    bad
}

/// Master count matches the shard count.
pub fn master_storage_count(g: &ClusterGraph) -> Vec<CheckFinding> {
    let masters = g.storages_with_role(InnerRole::Master).count();
    match g.expected_master_count() {
        Some(expected) if expected as usize == masters => Vec::new(),
        Some(expected) => vec![CheckFinding::cluster(format!(
            "shard count {expected} != master storage count {masters}"
        ))],
        None => vec![CheckFinding::cluster("cluster has no shard count")],
    }
}

/// Each master replicates to exactly one standby slave.
pub fn standby_slave_unique(g: &ClusterGraph) -> Vec<CheckFinding> {
    let index = g.storage_index();
    let mut bad = Vec::new();

    for master in g.storages_with_role(InnerRole::Master) {
        let standbys: Vec<_> = g
            .replication_edges
            .iter()
            .filter(|e| e.ejector == master.id)
            .filter_map(|e| index.get(&e.receiver))
            .filter(|r| r.is_standby)
            .collect();

        match standbys.as_slice() {
            [_] => {}
            [] => bad.push(CheckFinding::instance("no standby slave", master)),
            many => bad.push(CheckFinding::instance(
                format!(
                    "more than one standby slave: {}",
                    many.iter().map(|s| s.address()).collect::<Vec<_>>().join(",")
                ),
                master,
            )),
        }
    }
    bad
}

/// Standby slaves are running.
pub fn standby_slave_status(g: &ClusterGraph) -> Vec<CheckFinding> {
    g.storages
        .iter()
        .filter(|s| s.is_standby && s.is_role(InnerRole::Slave))
        .filter(|s| s.status != InstanceStatus::Running)
        .map(|s| CheckFinding::instance(format!("standby slave is {}", s.status), s))
        .collect()
}
