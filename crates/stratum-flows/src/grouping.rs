// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-machine grouping of cluster instances.
//!
//! Remote work is batched per machine: one call carries every port hosted on
//! an ip instead of one call per instance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stratum_topology::{ClusterGraph, ClusterType};

/// `ip -> sorted, de-duplicated ports`
pub type PortsByIp = BTreeMap<String, Vec<u16>>;

/// `bk_cloud_id -> ip -> ports`
pub type MachinesByCloud = BTreeMap<u64, PortsByIp>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineGroups {
    pub proxy: MachinesByCloud,
    pub storage: MachinesByCloud,
}

/// One machine and the ports it hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Machine<'a> {
    pub bk_cloud_id: u64,
    pub ip: &'a str,
    pub ports: &'a [u16],
}

/// Group the proxy and storage instances of `clusters` by cloud and ip.
///
/// TenDBSingle clusters contribute no proxies.
pub fn group_ips(clusters: &[ClusterGraph]) -> MachineGroups {
    let mut groups = MachineGroups::default();
    for cluster in clusters {
        if cluster.cluster_type != ClusterType::TenDBSingle {
            let proxies = groups.proxy.entry(cluster.bk_cloud_id).or_default();
            for proxy in &cluster.proxies {
                proxies.entry(proxy.ip.clone()).or_default().push(proxy.port);
            }
        }
        let storages = groups.storage.entry(cluster.bk_cloud_id).or_default();
        for storage in &cluster.storages {
            storages
                .entry(storage.ip.clone())
                .or_default()
                .push(storage.port);
        }
    }

    for by_ip in groups.proxy.values_mut().chain(groups.storage.values_mut()) {
        by_ip.retain(|_, ports| !ports.is_empty());
        for ports in by_ip.values_mut() {
            ports.sort_unstable();
            ports.dedup();
        }
    }
    groups.proxy.retain(|_, by_ip| !by_ip.is_empty());
    groups.storage.retain(|_, by_ip| !by_ip.is_empty());
    groups
}

impl MachineGroups {
    pub fn is_empty(&self) -> bool {
        self.proxy.is_empty() && self.storage.is_empty()
    }

    pub fn proxy_machines(&self) -> impl Iterator<Item = Machine<'_>> {
        machines(&self.proxy)
    }

    pub fn storage_machines(&self) -> impl Iterator<Item = Machine<'_>> {
        machines(&self.storage)
    }

    /// Every ip per cloud, proxies and storages merged.
    pub fn ips_by_cloud(&self) -> BTreeMap<u64, Vec<String>> {
        let mut out: BTreeMap<u64, Vec<String>> = BTreeMap::new();
        for machine in self.proxy_machines().chain(self.storage_machines()) {
            let ips = out.entry(machine.bk_cloud_id).or_default();
            if !ips.iter().any(|ip| ip == machine.ip) {
                ips.push(machine.ip.to_string());
            }
        }
        for ips in out.values_mut() {
            ips.sort();
        }
        out
    }

    /// Proxy ips per cloud.
    pub fn proxy_ips_by_cloud(&self) -> BTreeMap<u64, Vec<String>> {
        self.proxy
            .iter()
            .map(|(cloud, by_ip)| (*cloud, by_ip.keys().cloned().collect()))
            .collect()
    }
}

fn machines(by_cloud: &MachinesByCloud) -> impl Iterator<Item = Machine<'_>> {
    by_cloud.iter().flat_map(|(cloud, by_ip)| {
        by_ip.iter().map(move |(ip, ports)| Machine {
            bk_cloud_id: *cloud,
            ip,
            ports,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_topology::{ProxyInstance, StorageInstance};

    fn storage(id: u64, ip: &str, port: u16) -> StorageInstance {
        serde_json::from_value(serde_json::json!({"id": id, "ip": ip, "port": port})).unwrap()
    }

    fn proxy(id: u64, ip: &str, port: u16) -> ProxyInstance {
        serde_json::from_value(serde_json::json!({"id": id, "ip": ip, "port": port})).unwrap()
    }

    #[test]
    fn test_ports_on_one_ip_are_batched() {
        let mut a = ClusterGraph::new(1, ClusterType::TenDBHA);
        a.storages = vec![storage(1, "10.0.0.1", 20001), storage(2, "10.0.0.2", 20000)];
        a.proxies = vec![proxy(3, "10.0.1.1", 10000)];
        let mut b = ClusterGraph::new(2, ClusterType::TenDBHA);
        b.storages = vec![storage(4, "10.0.0.1", 20000)];
        b.proxies = vec![proxy(5, "10.0.1.1", 10001)];

        let groups = group_ips(&[a, b]);
        assert_eq!(groups.storage[&0]["10.0.0.1"], vec![20000, 20001]);
        assert_eq!(groups.storage[&0].len(), 2);
        assert_eq!(groups.proxy[&0]["10.0.1.1"], vec![10000, 10001]);
        assert_eq!(groups.storage_machines().count(), 2);
    }

    #[test]
    fn test_clouds_are_kept_apart() {
        let mut a = ClusterGraph::new(1, ClusterType::TenDBSingle);
        a.storages = vec![storage(1, "10.0.0.1", 20000)];
        a.proxies = vec![proxy(2, "10.0.1.1", 10000)];
        let mut b = ClusterGraph::new(2, ClusterType::TenDBSingle);
        b.bk_cloud_id = 7;
        b.storages = vec![storage(3, "10.0.0.1", 20000)];

        let groups = group_ips(&[a, b]);
        assert!(groups.proxy.is_empty());
        assert_eq!(groups.storage.keys().copied().collect::<Vec<_>>(), vec![0, 7]);
        assert_eq!(groups.ips_by_cloud()[&7], vec!["10.0.0.1".to_string()]);
    }

    #[test]
    fn test_empty_clusters_group_to_nothing() {
        let groups = group_ips(&[ClusterGraph::new(1, ClusterType::TenDBCluster)]);
        assert!(groups.is_empty());
        assert!(groups.ips_by_cloud().is_empty());
    }
}
