// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Replication direction and scope.

use crate::finding::CheckFinding;
use crate::graph::{ClusterGraph, InnerRole};

/// A master only ever ejects.
pub fn master_as_ejector(g: &ClusterGraph) -> Vec<CheckFinding> {
    let index = g.storage_index();
    g.replication_edges
        .iter()
        .filter_map(|e| {
            let receiver = index.get(&e.receiver)?;
            if !receiver.is_role(InnerRole::Master) {
                return None;
            }
            let source = index
                .get(&e.ejector)
                .map(|s| s.address())
                .unwrap_or_else(|| format!("#{}", e.ejector));
            Some(CheckFinding::instance(
                format!("master receives replication from {source}"),
                *receiver,
            ))
        })
        .collect()
}

/// A slave only ever receives.
pub fn slave_as_receiver(g: &ClusterGraph) -> Vec<CheckFinding> {
    let index = g.storage_index();
    g.replication_edges
        .iter()
        .filter_map(|e| {
            let ejector = index.get(&e.ejector)?;
            if !ejector.is_role(InnerRole::Slave) {
                return None;
            }
            let sink = index
                .get(&e.receiver)
                .map(|s| s.address())
                .unwrap_or_else(|| format!("#{}", e.receiver));
            Some(CheckFinding::instance(
                format!("slave ejects replication to {sink}"),
                *ejector,
            ))
        })
        .collect()
}

/// No replication leaves the cluster.
pub fn replicate_out(g: &ClusterGraph) -> Vec<CheckFinding> {
    let index = g.storage_index();
    let mut bad = Vec::new();

    for e in &g.replication_edges {
        let ejector = index.get(&e.ejector);
        let receiver = index.get(&e.receiver);
        if !e.external && ejector.is_some() && receiver.is_some() {
            continue;
        }
        let message = format!(
            "replication {} -> {} leaves the cluster",
            ejector.map(|s| s.address()).unwrap_or_else(|| format!("#{}", e.ejector)),
            receiver.map(|s| s.address()).unwrap_or_else(|| format!("#{}", e.receiver)),
        );
        bad.push(match ejector.or(receiver) {
            Some(inside) => CheckFinding::instance(message, *inside),
            None => CheckFinding::cluster(message),
        });
    }
    bad
}
