// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stratum Topology - rule-based health checks over cluster graphs.
//!
//! - [`ClusterGraph`]: read-only snapshot of one cluster
//! - [`rules`]: pure check functions and the per-cluster-type [`RuleCatalog`]
//! - [`TopologyChecker`]: runs a rule set and aggregates [`CheckFinding`]s,
//!   for single checks and for periodic inspection sweeps
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stratum_topology::{MemoryGraphSource, RuleCatalog, TopologyChecker};
//!
//! let source = Arc::new(MemoryGraphSource::from_file("clusters.json").await?);
//! let checker = TopologyChecker::new(source, RuleCatalog::standard());
//! for finding in checker.run_checks(42).await? {
//!     println!("{finding}");
//! }
//! ```

pub mod engine;
pub mod error;
pub mod finding;
pub mod graph;
pub mod rules;
pub mod source;

pub use engine::{InspectionSummary, TopologyChecker};
pub use error::{Result, TopologyError};
pub use finding::{CheckFinding, CheckSubType, InstanceKind, InstanceRef, RuleCategory};
pub use graph::{
    ClusterEntry, ClusterGraph, ClusterStatus, ClusterType, EntryRole, InnerRole, InstanceId,
    InstancePhase, InstanceStatus, ProxyInstance, ProxyRole, ReplicationEdge, StorageInstance,
};
pub use rules::{Rule, RuleCatalog, RuleSet};
pub use source::{GraphSource, InspectionReport, MemoryGraphSource, MemoryReportSink, ReportSink};
