// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed activity kwargs.
//!
//! Builders serialize these into node kwargs; executors read them back with
//! `ActivityInput::kwargs_as`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use stratum_topology::ClusterType;

use crate::departs::PeripheralTool;
use crate::keys::{ActuatorPayload, MachineType, MetaOp, TicketType};

/// Kwargs of every activity that runs on managed machines.
///
/// The payload is sent once per ip in `exec_ips`, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteKwargs {
    pub bk_cloud_id: u64,
    pub exec_ips: Vec<String>,
    pub payload: ActuatorPayload,
    #[serde(default)]
    pub params: ActuatorParams,
}

impl RemoteKwargs {
    pub fn new(bk_cloud_id: u64, exec_ips: Vec<String>, payload: ActuatorPayload) -> Self {
        Self {
            bk_cloud_id,
            exec_ips,
            payload,
            params: ActuatorParams::default(),
        }
    }

    pub fn on(bk_cloud_id: u64, exec_ip: &str, payload: ActuatorPayload) -> Self {
        Self::new(bk_cloud_id, vec![exec_ip.to_string()], payload)
    }

    pub fn params(mut self, params: ActuatorParams) -> Self {
        self.params = params;
        self
    }
}

/// Parameters forwarded to the remote side. Unset fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bk_biz_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_type: Option<ClusterType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immute_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_module_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<MachineType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_list: Vec<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub departs: Vec<PeripheralTool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    /// `ip:port` pairs whose client connections must be drained.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub check_instances: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_proxy_host: Option<String>,
}

/// Kwargs of metadata activities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaKwargs {
    /// Required for `db_meta`; other keys carry a fixed op.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<MetaOp>,
    pub cluster_id: u64,
    #[serde(default)]
    pub bk_biz_id: u64,
    #[serde(default)]
    pub bk_cloud_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_list: Vec<u16>,
}

impl MetaKwargs {
    pub fn cluster(bk_biz_id: u64, cluster_id: u64) -> Self {
        Self {
            bk_biz_id,
            cluster_id,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnTicketKwargs {
    pub ticket_type: TicketType,
    pub bk_biz_id: u64,
    pub creator: String,
    #[serde(default)]
    pub remark: String,
    pub details: Value,
}
