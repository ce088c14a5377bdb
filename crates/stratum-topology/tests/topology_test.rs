// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end checks over complete cluster graphs.

use std::sync::Arc;

use stratum_topology::rules::{self, Rule};
use stratum_topology::{
    CheckFinding, CheckSubType, ClusterEntry, ClusterGraph, ClusterType, EntryRole, InnerRole,
    InstanceKind, InstanceStatus, MemoryGraphSource, MemoryReportSink, ProxyInstance, ProxyRole,
    ReplicationEdge, RuleCatalog, RuleCategory, RuleSet, StorageInstance, TopologyChecker,
};

// ============================================================================
// Fixtures
// ============================================================================

fn proxy(id: u64, role: ProxyRole, storage_ids: Vec<u64>) -> ProxyInstance {
    ProxyInstance {
        id,
        ip: format!("10.1.0.{id}"),
        port: 25000,
        admin_port: Some(26000),
        role: Some(role),
        status: Default::default(),
        phase: Default::default(),
        cluster_ids: vec![1],
        storage_ids,
    }
}

fn storage(id: u64, role: Option<InnerRole>, standby: bool) -> StorageInstance {
    StorageInstance {
        id,
        ip: format!("10.2.0.{id}"),
        port: 20000,
        inner_role: role,
        status: Default::default(),
        phase: Default::default(),
        is_standby: standby,
        cluster_ids: vec![1],
    }
}

fn edge(ejector: u64, receiver: u64) -> ReplicationEdge {
    ReplicationEdge {
        ejector,
        receiver,
        external: false,
    }
}

/// Healthy three-shard TenDBCluster: masters 11-13, standby slaves 21-23,
/// two master spiders, two slave spiders, one entry per side.
fn healthy_tendbcluster() -> ClusterGraph {
    let mut g = ClusterGraph::new(1, ClusterType::TenDBCluster);
    g.name = "spider.demo.db".into();
    g.bk_biz_id = 3;
    g.shard_count = Some(3);
    g.storages = vec![
        storage(11, Some(InnerRole::Master), false),
        storage(12, Some(InnerRole::Master), false),
        storage(13, Some(InnerRole::Master), false),
        storage(21, Some(InnerRole::Slave), true),
        storage(22, Some(InnerRole::Slave), true),
        storage(23, Some(InnerRole::Slave), true),
    ];
    g.replication_edges = vec![edge(11, 21), edge(12, 22), edge(13, 23)];
    g.proxies = vec![
        proxy(1, ProxyRole::SpiderMaster, vec![11, 12, 13]),
        proxy(2, ProxyRole::SpiderMaster, vec![11, 12, 13]),
        proxy(3, ProxyRole::SpiderSlave, vec![21, 22, 23]),
        proxy(4, ProxyRole::SpiderSlave, vec![21, 22, 23]),
    ];
    g.entries = vec![
        ClusterEntry {
            entry: "spider.demo.db".into(),
            role: EntryRole::MasterEntry,
            proxy_ids: vec![1, 2],
            storage_ids: vec![],
        },
        ClusterEntry {
            entry: "spider-dr.demo.db".into(),
            role: EntryRole::SlaveEntry,
            proxy_ids: vec![3, 4],
            storage_ids: vec![],
        },
    ];
    g
}

fn healthy_tendbha() -> ClusterGraph {
    let mut g = ClusterGraph::new(2, ClusterType::TenDBHA);
    g.storages = vec![
        storage(31, Some(InnerRole::Master), false),
        storage(32, Some(InnerRole::Slave), true),
    ];
    g.replication_edges = vec![edge(31, 32)];
    g.proxies = vec![
        proxy(5, ProxyRole::Proxy, vec![31]),
        proxy(6, ProxyRole::Proxy, vec![31]),
    ];
    g.entries = vec![ClusterEntry {
        entry: "ha.demo.db".into(),
        role: EntryRole::MasterEntry,
        proxy_ids: vec![5, 6],
        storage_ids: vec![],
    }];
    for p in &mut g.proxies {
        p.cluster_ids = vec![2];
    }
    for s in &mut g.storages {
        s.cluster_ids = vec![2];
    }
    g
}

fn checker() -> TopologyChecker {
    TopologyChecker::new(Arc::new(MemoryGraphSource::new()), RuleCatalog::standard())
}

fn about(findings: &[CheckFinding], kind: InstanceKind, id: u64) -> Vec<&CheckFinding> {
    findings
        .iter()
        .filter(|f| {
            f.instance
                .as_ref()
                .is_some_and(|i| i.kind == kind && i.id == id)
        })
        .collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_healthy_clusters_have_no_findings() {
    let checker = checker();
    assert!(checker.check_graph(&healthy_tendbcluster()).is_empty());
    assert!(checker.check_graph(&healthy_tendbha()).is_empty());
}

#[test]
fn test_shard_count_mismatch_reported_once() {
    let checker = checker();
    let mut g = healthy_tendbcluster();
    let removed = g.storages.remove(2);
    assert_eq!(removed.id, 13);
    g.replication_edges.retain(|e| e.ejector != 13);
    for p in g.proxies.iter_mut().take(2) {
        p.storage_ids.retain(|id| *id != 13);
    }

    let findings = checker.check_graph(&g);
    assert_eq!(findings.len(), 1, "{findings:#?}");
    let finding = &findings[0];
    assert_eq!(finding.category, RuleCategory::Cardinality);
    assert_eq!(finding.rule, "master_storage_count");
    assert!(finding.message.contains('3') && finding.message.contains('2'));

    g.storages.push(removed);
    g.replication_edges.push(edge(13, 23));
    assert!(checker.check_graph(&g).is_empty());
}

#[test]
fn test_entry_bound_to_storage() {
    let mut g = healthy_tendbcluster();
    g.entries[0].storage_ids = vec![21];

    let findings = checker().check_graph(&g);
    assert_eq!(findings.len(), 1, "{findings:#?}");
    assert_eq!(findings[0].category, RuleCategory::Binding);
    let instance = findings[0].instance.as_ref().unwrap();
    assert_eq!(instance.kind, InstanceKind::Storage);
    assert_eq!(instance.id, 21);
    assert_eq!(instance.address.as_deref(), Some("10.2.0.21:20000"));
}

#[test]
fn test_malformed_storage_does_not_stop_other_rules() {
    let mut g = healthy_tendbcluster();
    g.storages.push(storage(30, None, false));
    g.proxies[3].status = InstanceStatus::Unavailable;

    let findings = checker().check_graph(&g);

    let malformed = about(&findings, InstanceKind::Storage, 30);
    assert_eq!(malformed.len(), 1, "{findings:#?}");
    assert_eq!(malformed[0].rule, "master_status");

    let proxy = about(&findings, InstanceKind::Proxy, 4);
    assert_eq!(proxy.len(), 1);
    assert_eq!(proxy[0].rule, "instance_status");
    assert!(findings.iter().any(|f| f.rule == "cluster_status"));
    assert!(findings.iter().any(|f| f.rule == "entry_bind_proxy"
        && f.message.contains("binds 2 spider_slave but cluster has 1 healthy")));
}

#[test]
fn test_proxy_reaching_wrong_role() {
    let mut g = healthy_tendbcluster();
    g.proxies[0].storage_ids.push(21);

    let findings = checker().check_graph(&g);
    assert_eq!(findings.len(), 1, "{findings:#?}");
    assert_eq!(findings[0].category, RuleCategory::AccessPath);
    assert_eq!(findings[0].message, "spider_master accesses slave: 10.2.0.21:20000");
    assert_eq!(findings[0].instance.as_ref().unwrap().id, 1);
}

#[test]
fn test_too_few_master_spiders() {
    let mut g = healthy_tendbcluster();
    g.proxies[1].phase = stratum_topology::InstancePhase::Offline;

    let findings = checker().check_graph(&g);
    let rules: Vec<_> = findings.iter().map(|f| f.rule.as_str()).collect();
    assert_eq!(rules, vec!["master_proxy_count", "entry_bind_proxy"]);
}

#[test]
fn test_reversed_and_external_replication() {
    let mut g = healthy_tendbcluster();
    g.replication_edges.push(edge(21, 11));
    g.replication_edges.push(ReplicationEdge {
        ejector: 12,
        receiver: 500,
        external: true,
    });

    let findings = checker().check_graph(&g);
    let replication: Vec<_> = findings
        .iter()
        .filter(|f| f.category == RuleCategory::Replication)
        .map(|f| f.rule.as_str())
        .collect();
    assert_eq!(
        replication,
        vec!["master_as_ejector", "slave_as_receiver", "replicate_out"]
    );
}

fn exploding(_: &ClusterGraph) -> Vec<CheckFinding> {
    panic!("storage index out of range");
}

#[test]
fn test_crashing_rule_is_isolated() {
    let mut catalog = RuleCatalog::new();
    catalog.insert(
        ClusterType::TenDBCluster,
        RuleSet::new(vec![
            Rule::new("exploding", RuleCategory::Status, exploding),
            Rule::new(
                "master_storage_count",
                RuleCategory::Cardinality,
                rules::master_storage_count,
            ),
        ]),
    );
    let checker = TopologyChecker::new(Arc::new(MemoryGraphSource::new()), catalog);

    let mut g = healthy_tendbcluster();
    g.shard_count = Some(4);
    let findings = checker.check_graph(&g);

    assert_eq!(findings.len(), 2);
    assert_eq!(findings[0].subtype, CheckSubType::RuleFailure);
    assert_eq!(findings[0].message, "rule crashed: storage index out of range");
    assert_eq!(findings[1].message, "shard count 4 != master storage count 3");
}

#[test]
fn test_cluster_type_without_rules() {
    let mut g = healthy_tendbcluster();
    g.cluster_type = ClusterType::Other;
    g.status = stratum_topology::ClusterStatus::Abnormal;
    assert!(checker().check_graph(&g).is_empty());
}

#[test]
fn test_single_only_checks_membership_and_status() {
    let mut g = ClusterGraph::new(7, ClusterType::TenDBSingle);
    let mut s = storage(70, Some(InnerRole::Orphan), false);
    s.cluster_ids = vec![7];
    s.status = InstanceStatus::Unavailable;
    g.storages = vec![s];

    let rules: Vec<_> = checker()
        .check_graph(&g)
        .into_iter()
        .map(|f| f.rule)
        .collect();
    assert_eq!(rules, vec!["cluster_status", "instance_status"]);
}

// ============================================================================
// Loading and inspection
// ============================================================================

#[tokio::test]
async fn test_run_checks_loads_from_source() {
    let mut broken = healthy_tendbcluster();
    broken.entries[1].storage_ids = vec![22];
    let source = Arc::new(MemoryGraphSource::from_graphs([broken]));
    let checker = TopologyChecker::new(source.clone(), RuleCatalog::standard());

    let findings = checker.run_checks(1).await.unwrap();
    assert_eq!(findings.len(), 1);

    let err = checker.run_checks(404).await.unwrap_err();
    assert_eq!(err.error_code(), "CLUSTER_NOT_FOUND");

    source.put(healthy_tendbcluster()).await;
    assert!(checker.run_checks(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_inspection_sweep_survives_missing_clusters() {
    let mut broken = healthy_tendbha();
    broken.storages[0].status = InstanceStatus::Unavailable;
    broken.cluster_id = 3;
    let source = Arc::new(MemoryGraphSource::from_graphs([healthy_tendbcluster(), broken]));
    let checker = TopologyChecker::new(source, RuleCatalog::standard());
    let sink = MemoryReportSink::new();

    let summary = checker.inspect(&[1, 99, 3], &sink).await;

    assert_eq!(summary.checked, 2);
    assert_eq!(summary.healthy, 1);
    assert_eq!(summary.unhealthy, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, 99);

    let reports = sink.reports().await;
    assert_eq!(reports.len(), 2);
    assert!(reports[0].is_healthy());
    assert_eq!(reports[1].cluster_id, 3);
    assert_eq!(reports[1].findings.len(), summary.findings);
}

#[tokio::test]
async fn test_graph_document_loads_from_json() {
    let json = serde_json::to_string(&vec![healthy_tendbcluster()]).unwrap();
    let source = MemoryGraphSource::from_json(&json).unwrap();
    let checker = TopologyChecker::new(Arc::new(source), RuleCatalog::standard());
    assert!(checker.run_checks(1).await.unwrap().is_empty());
}
