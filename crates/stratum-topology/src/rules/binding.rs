// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::finding::{CheckFinding, InstanceRef};
use crate::graph::ClusterGraph;

/// An entry binds every healthy spider of its role, and nothing else.
pub fn entry_bind_proxy(g: &ClusterGraph) -> Vec<CheckFinding> {
    let mut bad = Vec::new();
    for entry in &g.entries {
        let role = entry.role.spider_role();
        let healthy = g.healthy_proxy_count(role);
        let bound = entry.proxy_ids.len();
        if bound != healthy {
            bad.push(CheckFinding::cluster(format!(
                "entry {} binds {bound} {role} but cluster has {healthy} healthy {role}",
                entry.entry
            )));
        }
    }
    bad
}

/// Entries never bind storages directly.
pub fn entry_bind_storage(g: &ClusterGraph) -> Vec<CheckFinding> {
    g.entries
        .iter()
        .flat_map(|entry| {
            entry.storage_ids.iter().map(move |id| {
                let instance = g
                    .storage(*id)
                    .map(InstanceRef::from)
                    .unwrap_or_else(|| InstanceRef::unknown_storage(*id));
                CheckFinding::instance(
                    format!("entry {} is bound to a storage instance", entry.entry),
                    instance,
                )
            })
        })
        .collect()
}
