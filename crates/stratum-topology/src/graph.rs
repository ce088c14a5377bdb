// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory cluster topology snapshot.
//!
//! A [`ClusterGraph`] is loaded once per check with every relationship
//! already materialized: proxies know which storages they reach, entries
//! know what they bind, and replication edges are listed explicitly. Rules
//! only read it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub type InstanceId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString)]
pub enum ClusterType {
    #[serde(rename = "tendbsingle")]
    #[strum(serialize = "tendbsingle")]
    TenDBSingle,
    #[serde(rename = "tendbha")]
    #[strum(serialize = "tendbha")]
    TenDBHA,
    #[serde(rename = "tendbcluster")]
    #[strum(serialize = "tendbcluster")]
    TenDBCluster,
    /// Engine families without topology rules.
    #[serde(other)]
    #[strum(serialize = "other")]
    Other,
}

impl ClusterType {
    /// Proxy role that serves the master entry.
    pub fn master_proxy_role(self) -> Option<ProxyRole> {
        match self {
            Self::TenDBCluster => Some(ProxyRole::SpiderMaster),
            Self::TenDBHA => Some(ProxyRole::Proxy),
            Self::TenDBSingle | Self::Other => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClusterStatus {
    #[default]
    Normal,
    Abnormal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InstanceStatus {
    #[default]
    Running,
    Unavailable,
    Restoring,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InstancePhase {
    #[default]
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InnerRole {
    Master,
    Slave,
    Repeater,
    Orphan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProxyRole {
    SpiderMaster,
    SpiderSlave,
    SpiderMnt,
    SpiderSlaveMnt,
    /// Plain proxy in front of a TenDBHA pair.
    Proxy,
}

impl ProxyRole {
    /// Storage role this proxy is allowed to reach.
    pub fn accessible_storage_role(self) -> InnerRole {
        match self {
            Self::SpiderMaster | Self::SpiderMnt | Self::Proxy => InnerRole::Master,
            Self::SpiderSlave | Self::SpiderSlaveMnt => InnerRole::Slave,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntryRole {
    MasterEntry,
    SlaveEntry,
}

impl EntryRole {
    /// Spider role an entry of this kind must bind.
    pub fn spider_role(self) -> ProxyRole {
        match self {
            Self::MasterEntry => ProxyRole::SpiderMaster,
            Self::SlaveEntry => ProxyRole::SpiderSlave,
        }
    }
}

/// Access-layer instance (spider or proxy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyInstance {
    pub id: InstanceId,
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub admin_port: Option<u16>,
    #[serde(default)]
    pub role: Option<ProxyRole>,
    #[serde(default)]
    pub status: InstanceStatus,
    #[serde(default)]
    pub phase: InstancePhase,
    /// Every cluster the metadata store attaches this instance to.
    #[serde(default)]
    pub cluster_ids: Vec<u64>,
    /// Storages this proxy is configured to route to.
    #[serde(default)]
    pub storage_ids: Vec<InstanceId>,
}

impl ProxyInstance {
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn is_healthy(&self) -> bool {
        self.status == InstanceStatus::Running && self.phase == InstancePhase::Online
    }
}

/// Data-layer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageInstance {
    pub id: InstanceId,
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub inner_role: Option<InnerRole>,
    #[serde(default)]
    pub status: InstanceStatus,
    #[serde(default)]
    pub phase: InstancePhase,
    #[serde(default)]
    pub is_standby: bool,
    #[serde(default)]
    pub cluster_ids: Vec<u64>,
}

impl StorageInstance {
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn is_role(&self, role: InnerRole) -> bool {
        self.inner_role == Some(role)
    }
}

/// Directed replication pair, ejector (source) to receiver (sink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationEdge {
    pub ejector: InstanceId,
    pub receiver: InstanceId,
    /// Set when one end lives outside this cluster.
    #[serde(default)]
    pub external: bool,
}

/// Access entry (domain name) of a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEntry {
    pub entry: String,
    pub role: EntryRole,
    #[serde(default)]
    pub proxy_ids: Vec<InstanceId>,
    #[serde(default)]
    pub storage_ids: Vec<InstanceId>,
}

/// Snapshot of one cluster and everything hanging off it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterGraph {
    pub cluster_id: u64,
    #[serde(default)]
    pub name: String,
    pub cluster_type: ClusterType,
    #[serde(default)]
    pub status: ClusterStatus,
    #[serde(default)]
    pub bk_biz_id: u64,
    #[serde(default)]
    pub bk_cloud_id: u64,
    #[serde(default)]
    pub db_module_id: u64,
    #[serde(default)]
    pub proxies: Vec<ProxyInstance>,
    #[serde(default)]
    pub storages: Vec<StorageInstance>,
    #[serde(default)]
    pub replication_edges: Vec<ReplicationEdge>,
    #[serde(default)]
    pub entries: Vec<ClusterEntry>,
    /// Number of shards, for sharded cluster types.
    #[serde(default)]
    pub shard_count: Option<u32>,
}

impl ClusterGraph {
    pub fn new(cluster_id: u64, cluster_type: ClusterType) -> Self {
        Self {
            cluster_id,
            name: String::new(),
            cluster_type,
            status: ClusterStatus::Normal,
            bk_biz_id: 0,
            bk_cloud_id: 0,
            db_module_id: 0,
            proxies: Vec::new(),
            storages: Vec::new(),
            replication_edges: Vec::new(),
            entries: Vec::new(),
            shard_count: None,
        }
    }

    pub fn storage(&self, id: InstanceId) -> Option<&StorageInstance> {
        self.storages.iter().find(|s| s.id == id)
    }

    pub fn proxy(&self, id: InstanceId) -> Option<&ProxyInstance> {
        self.proxies.iter().find(|p| p.id == id)
    }

    /// Storages indexed by id.
    pub fn storage_index(&self) -> HashMap<InstanceId, &StorageInstance> {
        self.storages.iter().map(|s| (s.id, s)).collect()
    }

    pub fn storages_with_role(&self, role: InnerRole) -> impl Iterator<Item = &StorageInstance> {
        self.storages.iter().filter(move |s| s.is_role(role))
    }

    /// Healthy (running and online) proxies with the given role.
    pub fn healthy_proxy_count(&self, role: ProxyRole) -> usize {
        self.proxies
            .iter()
            .filter(|p| p.role == Some(role) && p.is_healthy())
            .count()
    }

    /// Number of master storages the cluster should have.
    pub fn expected_master_count(&self) -> Option<u32> {
        match self.cluster_type {
            ClusterType::TenDBCluster => self.shard_count,
            ClusterType::TenDBHA | ClusterType::TenDBSingle => Some(1),
            ClusterType::Other => None,
        }
    }
}
