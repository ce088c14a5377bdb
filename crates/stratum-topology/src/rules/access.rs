// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::finding::CheckFinding;
use crate::graph::ClusterGraph;

/// A proxy reaches only storages of the role its own role maps to:
/// master-side spiders and plain proxies reach masters, slave-side spiders
/// reach slaves. Findings are keyed by proxy.
pub fn proxy_access_storage(g: &ClusterGraph) -> Vec<CheckFinding> {
    let index = g.storage_index();
    let mut bad = Vec::new();

    for proxy in &g.proxies {
        let Some(role) = proxy.role else {
            bad.push(CheckFinding::instance("proxy has no role", proxy));
            continue;
        };
        let allowed = role.accessible_storage_role();

        for id in &proxy.storage_ids {
            let Some(storage) = index.get(id) else {
                bad.push(CheckFinding::instance(
                    format!("{role} routes to unknown storage #{id}"),
                    proxy,
                ));
                continue;
            };
            // Role-less storages are reported by master_status.
            let Some(actual) = storage.inner_role else {
                continue;
            };
            if actual != allowed {
                bad.push(CheckFinding::instance(
                    format!("{role} accesses {actual}: {}", storage.address()),
                    proxy,
                ));
            }
        }
    }
    bad
}
