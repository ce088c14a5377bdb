// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Names shared by flow builders and executors.
//!
//! [`ActivityKey`] is what a node is bound to in the registry,
//! [`ActuatorPayload`] is what the remote side is asked to run and
//! [`MetaOp`] is what gets written to the metadata store.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use stratum_pipeline::ExecutorKey;
use stratum_topology::ClusterType;

/// Remote agent plugins installed on every managed machine.
pub const NODEMAN_PLUGINS: [&str; 2] = ["bkmonitorbeat", "bkunifylogbeat"];

/// Package holding the remote actuator binary.
pub const ACTUATOR_PACKAGE: &str = "db-actuator";

/// Fewest proxies a cluster may be left with.
pub const MIN_PROXY_COUNT: usize = 2;

/// Executor keys registered by [`crate::standard_registry`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityKey {
    TransFile,
    DownloadBackupClient,
    InstallNodemanPlugin,
    ExecActuator,
    CheckClientConn,
    DropProxyUsersInBackend,
    ClearMachine,
    ClusterStandardizeTransModule,
    DnsManage,
    DelCcServiceInstance,
    DbMeta,
    SpawnTicket,
}

impl From<ActivityKey> for ExecutorKey {
    fn from(key: ActivityKey) -> Self {
        ExecutorKey::new(key.as_ref())
    }
}

/// Work the remote side knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActuatorPayload {
    TransFile,
    DownloadBackupClient,
    InstallNodemanPlugin,
    CollectSysinfo,
    PushExporterCnf,
    PreparePeripheraltoolsBinary,
    StandardizeMysql,
    StandardizeProxy,
    PushMysqlCrondConfig,
    PushMysqlMonitorConfig,
    PushMysqlDbbackupConfig,
    PushMysqlChecksumConfig,
    PushMysqlRotatebinlogConfig,
    CheckClientConn,
    DropProxyUsers,
    ClearSurroundingConfig,
    UninstallProxy,
    ClearMachine,
}

/// Role a machine plays, as understood by the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MachineType {
    Single,
    Backend,
    Proxy,
    Remote,
    Spider,
}

impl MachineType {
    pub fn storage_of(cluster_type: ClusterType) -> Option<Self> {
        match cluster_type {
            ClusterType::TenDBSingle => Some(Self::Single),
            ClusterType::TenDBHA => Some(Self::Backend),
            ClusterType::TenDBCluster => Some(Self::Remote),
            ClusterType::Other => None,
        }
    }

    pub fn proxy_of(cluster_type: ClusterType) -> Option<Self> {
        match cluster_type {
            ClusterType::TenDBHA => Some(Self::Proxy),
            ClusterType::TenDBCluster => Some(Self::Spider),
            ClusterType::TenDBSingle | ClusterType::Other => None,
        }
    }
}

/// Metadata store writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MetaOp {
    ClusterStandardizeTransModule,
    DnsRecycle,
    DelServiceInstance,
    MysqlProxyReduce,
}

/// Follow-up tickets a flow may spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketType {
    MysqlClusterStandardize,
}
