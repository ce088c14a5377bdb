// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Findings emitted by topology rules.
//!
//! A finding is data, not an error: a healthy cluster yields none, and a
//! broken one yields one finding per violation.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::graph::{InstanceId, ProxyInstance, StorageInstance};

/// Family a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RuleCategory {
    /// Every instance belongs to exactly one cluster.
    Uniqueness,
    /// Cluster and instance status agree.
    Status,
    /// Minimum and exact counts per role.
    Cardinality,
    /// Exactly one standby replica per master.
    StandbyUniqueness,
    /// What entries bind.
    Binding,
    /// Which storages a proxy may reach.
    AccessPath,
    /// Direction and scope of replication edges.
    Replication,
}

/// Report bucket a finding is filed under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum CheckSubType {
    #[default]
    ClusterTopo,
    UniqueCluster,
    /// The rule itself failed while checking.
    RuleFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InstanceKind {
    Proxy,
    Storage,
}

/// Identity of the instance a finding is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceRef {
    pub kind: InstanceKind,
    pub id: InstanceId,
    /// `ip:port`, when the instance is part of the loaded graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl InstanceRef {
    /// Reference to a storage id that is not part of the loaded graph.
    pub fn unknown_storage(id: InstanceId) -> Self {
        Self {
            kind: InstanceKind::Storage,
            id,
            address: None,
        }
    }
}

impl From<&ProxyInstance> for InstanceRef {
    fn from(p: &ProxyInstance) -> Self {
        Self {
            kind: InstanceKind::Proxy,
            id: p.id,
            address: Some(p.address()),
        }
    }
}

impl From<&StorageInstance> for InstanceRef {
    fn from(s: &StorageInstance) -> Self {
        Self {
            kind: InstanceKind::Storage,
            id: s.id,
            address: Some(s.address()),
        }
    }
}

impl std::fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.address {
            Some(addr) => write!(f, "{} {}", self.kind, addr),
            None => write!(f, "{} #{}", self.kind, self.id),
        }
    }
}

/// One violation reported by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFinding {
    /// Name of the rule that produced the finding.
    pub rule: String,
    pub category: RuleCategory,
    pub subtype: CheckSubType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<InstanceRef>,
}

impl CheckFinding {
    /// Cluster-level finding. The engine fills in `rule` and `category`.
    pub fn cluster(message: impl Into<String>) -> Self {
        Self {
            rule: String::new(),
            category: RuleCategory::Status,
            subtype: CheckSubType::ClusterTopo,
            message: message.into(),
            instance: None,
        }
    }

    /// Finding about one instance.
    pub fn instance(message: impl Into<String>, instance: impl Into<InstanceRef>) -> Self {
        Self {
            instance: Some(instance.into()),
            ..Self::cluster(message)
        }
    }

    pub fn with_subtype(mut self, subtype: CheckSubType) -> Self {
        self.subtype = subtype;
        self
    }
}

impl std::fmt::Display for CheckFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}] {}", self.category, self.rule, self.message)?;
        if let Some(instance) = &self.instance {
            write!(f, " ({instance})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StorageInstance;

    #[test]
    fn test_finding_display() {
        let storage: StorageInstance =
            serde_json::from_str(r#"{"id": 3, "ip": "1.1.1.1", "port": 20000}"#).unwrap();
        let mut finding = CheckFinding::instance("entry binds storage", &storage);
        finding.rule = "entry_bind_storage".into();
        finding.category = RuleCategory::Binding;
        assert_eq!(
            finding.to_string(),
            "[binding/entry_bind_storage] entry binds storage (storage 1.1.1.1:20000)"
        );
    }

    #[test]
    fn test_unknown_instance_display() {
        assert_eq!(InstanceRef::unknown_storage(9).to_string(), "storage #9");
    }
}
