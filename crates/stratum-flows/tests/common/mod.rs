// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for stratum-flows tests.
//!
//! A small fleet of clusters that share machines, recording collaborators and
//! helpers to look into built trees by node name.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;
use stratum_core::PipelineExecutor;
use stratum_core::persistence::MemoryPersistence;
use stratum_flows::kwargs::RemoteKwargs;
use stratum_flows::{Collaborators, MemoryMetadata, MemoryTickets, RecordingRemote, standard_registry};
use stratum_pipeline::{Activity, ExecutorRegistry, PipelineNode, SubProcess};
use stratum_topology::{ClusterGraph, ClusterType, ProxyInstance, StorageInstance};

pub struct Harness {
    pub remote: Arc<RecordingRemote>,
    pub metadata: Arc<MemoryMetadata>,
    pub tickets: Arc<MemoryTickets>,
    pub registry: Arc<ExecutorRegistry>,
}

impl Harness {
    pub fn new() -> Self {
        let remote = Arc::new(RecordingRemote::new());
        let metadata = Arc::new(MemoryMetadata::new());
        let tickets = Arc::new(MemoryTickets::new());
        let registry = Arc::new(standard_registry(&Collaborators {
            remote: remote.clone(),
            metadata: metadata.clone(),
            tickets: tickets.clone(),
        }));
        Self {
            remote,
            metadata,
            tickets,
            registry,
        }
    }

    pub fn executor(&self) -> PipelineExecutor {
        PipelineExecutor::builder()
            .persistence(Arc::new(MemoryPersistence::new()))
            .registry(self.registry.clone())
            .build()
            .unwrap()
    }
}

// ============================================================================
// Fleet
// ============================================================================

pub fn proxy(id: u64, ip: &str, port: u16) -> ProxyInstance {
    serde_json::from_value(json!({
        "id": id, "ip": ip, "port": port, "admin_port": port + 1000
    }))
    .unwrap()
}

pub fn storage(id: u64, ip: &str, port: u16, role: &str) -> StorageInstance {
    serde_json::from_value(json!({
        "id": id, "ip": ip, "port": port, "inner_role": role
    }))
    .unwrap()
}

fn cluster(id: u64, name: &str, cluster_type: ClusterType) -> ClusterGraph {
    let mut graph = ClusterGraph::new(id, cluster_type);
    graph.name = name.to_string();
    graph.bk_biz_id = 3;
    graph.db_module_id = 100 + id;
    graph
}

/// Clusters 1 and 2 are TenDBHA on shared machines, 3 is TenDBCluster,
/// 4 is TenDBSingle and 5 is a TenDBHA cluster without instances.
pub fn fleet() -> Vec<ClusterGraph> {
    let mut ha1 = cluster(1, "db1.test.db", ClusterType::TenDBHA);
    ha1.proxies = vec![
        proxy(11, "10.1.0.1", 10000),
        proxy(12, "10.1.0.2", 10000),
        proxy(13, "10.1.0.3", 10000),
    ];
    ha1.storages = vec![
        storage(14, "10.2.0.1", 20000, "master"),
        storage(15, "10.2.0.2", 20000, "slave"),
    ];

    let mut ha2 = cluster(2, "db2.test.db", ClusterType::TenDBHA);
    ha2.proxies = vec![proxy(21, "10.1.0.1", 10001), proxy(22, "10.1.0.2", 10001)];
    ha2.storages = vec![
        storage(24, "10.2.0.1", 20001, "master"),
        storage(25, "10.2.0.2", 20001, "slave"),
    ];

    let mut spider = cluster(3, "spider.test.db", ClusterType::TenDBCluster);
    spider.proxies = vec![proxy(31, "10.3.0.1", 25000), proxy(32, "10.3.0.2", 25000)];
    spider.storages = vec![
        storage(33, "10.4.0.1", 20000, "master"),
        storage(34, "10.4.0.1", 20001, "master"),
        storage(35, "10.4.0.2", 20000, "slave"),
        storage(36, "10.4.0.2", 20001, "slave"),
    ];

    let mut single = cluster(4, "single.test.db", ClusterType::TenDBSingle);
    single.storages = vec![storage(41, "10.5.0.1", 20000, "orphan")];

    let empty = cluster(5, "empty.test.db", ClusterType::TenDBHA);

    vec![ha1, ha2, spider, single, empty]
}

// ============================================================================
// Tree inspection
// ============================================================================

pub fn child_names(sub: &SubProcess) -> Vec<String> {
    sub.children.iter().map(|c| c.name().to_string()).collect()
}

/// First sub-process named `name`, depth first.
pub fn find_sub<'a>(root: &'a SubProcess, name: &str) -> &'a SubProcess {
    fn walk<'a>(sub: &'a SubProcess, name: &str) -> Option<&'a SubProcess> {
        if sub.name == name {
            return Some(sub);
        }
        sub.children.iter().find_map(|c| match c {
            PipelineNode::SubProcess(s) => walk(s, name),
            PipelineNode::Activity(_) => None,
        })
    }
    walk(root, name).unwrap_or_else(|| panic!("no sub-process named '{name}'"))
}

pub fn activity_names(sub: &SubProcess) -> Vec<String> {
    sub.activities().iter().map(|a| a.name.clone()).collect()
}

pub fn find_activity<'a>(root: &'a SubProcess, name: &str) -> &'a Activity {
    root.activities()
        .into_iter()
        .find(|a| a.name == name)
        .unwrap_or_else(|| panic!("no activity named '{name}'"))
}

pub fn remote_kwargs(activity: &Activity) -> RemoteKwargs {
    serde_json::from_value(serde_json::Value::Object(activity.kwargs.clone())).unwrap()
}
