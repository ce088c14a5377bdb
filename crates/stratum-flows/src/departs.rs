// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Peripheral tools ("departs") deployed next to database instances.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use stratum_topology::ClusterType;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PeripheralTool {
    BackupClient,
    MysqlDbbackup,
    DbaToolkit,
    MysqlCrond,
    MysqlMonitor,
    RotateBinlog,
    MysqlChecksum,
}

pub type Departs = BTreeSet<PeripheralTool>;

impl PeripheralTool {
    /// Every tool.
    pub fn all() -> Departs {
        Self::iter().collect()
    }

    /// Whether the tool has a configuration that is pushed per instance.
    pub fn has_config(self) -> bool {
        matches!(
            self,
            Self::MysqlDbbackup
                | Self::RotateBinlog
                | Self::MysqlMonitor
                | Self::MysqlChecksum
                | Self::MysqlCrond
        )
    }

    /// Package name handed to file transfer.
    pub fn package(self) -> String {
        self.to_string()
    }
}

/// Tools that apply to the storage layer of a cluster.
pub fn storage_departs(cluster_type: ClusterType, departs: &Departs) -> Departs {
    let mut out = departs.clone();
    if cluster_type == ClusterType::TenDBSingle {
        out.remove(&PeripheralTool::MysqlChecksum);
    }
    out
}

/// Tools that apply to the proxy layer of a cluster.
///
/// Proxies never run checksums. TenDBHA proxies hold no data, so backup and
/// binlog rotation are dropped as well. TenDBSingle has no proxies at all.
pub fn proxy_departs(cluster_type: ClusterType, departs: &Departs) -> Departs {
    let mut out = departs.clone();
    out.remove(&PeripheralTool::MysqlChecksum);
    match cluster_type {
        ClusterType::TenDBHA => {
            out.remove(&PeripheralTool::RotateBinlog);
            out.remove(&PeripheralTool::MysqlDbbackup);
        }
        ClusterType::TenDBSingle | ClusterType::Other => out.clear(),
        ClusterType::TenDBCluster => {}
    }
    out
}

/// Order in which per-instance configs are pushed on one machine.
pub const CONFIG_PUSH_ORDER: [PeripheralTool; 4] = [
    PeripheralTool::MysqlMonitor,
    PeripheralTool::MysqlDbbackup,
    PeripheralTool::MysqlChecksum,
    PeripheralTool::RotateBinlog,
];
