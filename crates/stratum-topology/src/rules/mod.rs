// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rule definitions and the per-cluster-type catalog.
//!
//! Each rule is a plain function over a [`ClusterGraph`]. Rules never see
//! each other's findings, so the order of a [`RuleSet`] only fixes the order
//! findings are reported in.

mod access;
mod binding;
mod membership;
mod replication;
mod status;

use std::collections::HashMap;

use crate::finding::{CheckFinding, RuleCategory};
use crate::graph::{ClusterGraph, ClusterType};

pub use access::proxy_access_storage;
pub use binding::{entry_bind_proxy, entry_bind_storage};
pub use membership::unique_membership;
pub use replication::{master_as_ejector, replicate_out, slave_as_receiver};
pub use status::{
    cluster_status, instance_status, master_entry_count, master_proxy_count,
    master_storage_count, master_status, standby_slave_status, standby_slave_unique,
};

pub type CheckFn = fn(&ClusterGraph) -> Vec<CheckFinding>;

/// A named check.
#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub category: RuleCategory,
    pub check: CheckFn,
}

impl Rule {
    pub const fn new(name: &'static str, category: RuleCategory, check: CheckFn) -> Self {
        Self {
            name,
            category,
            check,
        }
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish()
    }
}

/// Ordered list of rules for one cluster type.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Rule sets keyed by cluster type.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    sets: HashMap<ClusterType, RuleSet>,
}

impl RuleCatalog {
    /// Empty catalog; every cluster type checks clean.
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in rule sets for the MySQL family.
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        catalog.insert(ClusterType::TenDBCluster, tendbcluster_rules());
        catalog.insert(ClusterType::TenDBHA, tendbha_rules());
        catalog.insert(ClusterType::TenDBSingle, tendbsingle_rules());
        catalog
    }

    pub fn insert(&mut self, cluster_type: ClusterType, set: RuleSet) -> &mut Self {
        self.sets.insert(cluster_type, set);
        self
    }

    pub fn get(&self, cluster_type: ClusterType) -> Option<&RuleSet> {
        self.sets.get(&cluster_type)
    }
}

use RuleCategory::*;

const UNIQUE_MEMBERSHIP: Rule = Rule::new("unique_membership", Uniqueness, unique_membership);
const CLUSTER_STATUS: Rule = Rule::new("cluster_status", Status, cluster_status);
const INSTANCE_STATUS: Rule = Rule::new("instance_status", Status, instance_status);
const MASTER_ENTRY_COUNT: Rule = Rule::new("master_entry_count", Cardinality, master_entry_count);
const MASTER_PROXY_COUNT: Rule = Rule::new("master_proxy_count", Cardinality, master_proxy_count);
const MASTER_STATUS: Rule = Rule::new("master_status", Status, master_status);
const MASTER_STORAGE_COUNT: Rule =
    Rule::new("master_storage_count", Cardinality, master_storage_count);
const STANDBY_SLAVE_UNIQUE: Rule =
    Rule::new("standby_slave_unique", StandbyUniqueness, standby_slave_unique);
const STANDBY_SLAVE_STATUS: Rule = Rule::new("standby_slave_status", Status, standby_slave_status);
const ENTRY_BIND_PROXY: Rule = Rule::new("entry_bind_proxy", Binding, entry_bind_proxy);
const ENTRY_BIND_STORAGE: Rule = Rule::new("entry_bind_storage", Binding, entry_bind_storage);
const PROXY_ACCESS_STORAGE: Rule =
    Rule::new("proxy_access_storage", AccessPath, proxy_access_storage);
const MASTER_AS_EJECTOR: Rule = Rule::new("master_as_ejector", Replication, master_as_ejector);
const SLAVE_AS_RECEIVER: Rule = Rule::new("slave_as_receiver", Replication, slave_as_receiver);
const REPLICATE_OUT: Rule = Rule::new("replicate_out", Replication, replicate_out);

pub fn tendbcluster_rules() -> RuleSet {
    RuleSet::new(vec![
        UNIQUE_MEMBERSHIP,
        CLUSTER_STATUS,
        INSTANCE_STATUS,
        MASTER_ENTRY_COUNT,
        MASTER_PROXY_COUNT,
        MASTER_STATUS,
        MASTER_STORAGE_COUNT,
        STANDBY_SLAVE_UNIQUE,
        STANDBY_SLAVE_STATUS,
        ENTRY_BIND_PROXY,
        ENTRY_BIND_STORAGE,
        PROXY_ACCESS_STORAGE,
        MASTER_AS_EJECTOR,
        SLAVE_AS_RECEIVER,
        REPLICATE_OUT,
    ])
}

pub fn tendbha_rules() -> RuleSet {
    RuleSet::new(vec![
        UNIQUE_MEMBERSHIP,
        CLUSTER_STATUS,
        INSTANCE_STATUS,
        MASTER_ENTRY_COUNT,
        MASTER_PROXY_COUNT,
        MASTER_STATUS,
        MASTER_STORAGE_COUNT,
        STANDBY_SLAVE_UNIQUE,
        STANDBY_SLAVE_STATUS,
        PROXY_ACCESS_STORAGE,
        MASTER_AS_EJECTOR,
        SLAVE_AS_RECEIVER,
        REPLICATE_OUT,
    ])
}

pub fn tendbsingle_rules() -> RuleSet {
    RuleSet::new(vec![UNIQUE_MEMBERSHIP, CLUSTER_STATUS, INSTANCE_STATUS])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tendbcluster_rule_order() {
        let names = tendbcluster_rules().names();
        assert_eq!(names.first(), Some(&"unique_membership"));
        assert_eq!(names.last(), Some(&"replicate_out"));
        assert_eq!(names.len(), 15);
        let pos = |n| names.iter().position(|x| *x == n).unwrap();
        assert!(pos("master_storage_count") < pos("standby_slave_unique"));
        assert!(pos("entry_bind_storage") < pos("proxy_access_storage"));
    }

    #[test]
    fn test_catalog_has_no_set_for_other_engines() {
        let catalog = RuleCatalog::standard();
        assert!(catalog.get(ClusterType::Other).is_none());
        assert_eq!(catalog.get(ClusterType::TenDBSingle).unwrap().len(), 3);
    }
}
