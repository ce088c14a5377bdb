// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stratum Flows - concrete operational procedures built on stratum.
//!
//! - [`standardize`]: multi-stage cluster standardization
//! - [`proxy_reduce`]: draining and removing TenDBHA proxies
//! - [`autofix`]: follow-up tickets for unhealthy clusters
//! - [`preflight`]: topology checks before planning
//! - [`activities`]: executors over the [`collaborators`] contracts
//!
//! Flows only build trees; running them is left to
//! `stratum_core::PipelineExecutor`.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stratum_flows::{Collaborators, StandardizeRequest, standard_registry, standardize_pipeline};
//!
//! let registry = Arc::new(standard_registry(&collaborators));
//! let request = StandardizeRequest::new(3, ClusterType::TenDBHA, vec![1, 2]);
//! let tree = standardize_pipeline("run-1", registry.clone(), &request, &clusters)?;
//! executor.run("run-1", tree, ExecutionContext::from_params(&request)?).await?;
//! ```

pub mod activities;
pub mod autofix;
pub mod collaborators;
pub mod departs;
pub mod error;
pub mod grouping;
pub mod keys;
pub mod kwargs;
pub mod preflight;
pub mod proxy_reduce;
pub mod standardize;

pub use activities::{Collaborators, standard_registry};
pub use autofix::{autofix_pipeline, standardize_requests};
pub use collaborators::{
    CollaboratorError, DryRunRemote, MemoryMetadata, MemoryTickets, MetadataWriter,
    RecordingRemote, RemoteExecution, RemoteOutcome, RemoteRequest, TicketRequest, TicketService,
};
pub use departs::{Departs, PeripheralTool};
pub use error::{FlowError, Result};
pub use grouping::{Machine, MachineGroups, group_ips};
pub use keys::{ActivityKey, ActuatorPayload, MachineType, MetaOp, TicketType};
pub use preflight::preflight;
pub use proxy_reduce::{
    HostRef, ProxyReduceInfo, ProxyReduceRequest, add_proxy_reduce, proxy_reduce_pipeline,
};
pub use standardize::{StandardizeRequest, add_standardize_stages, standardize_pipeline};
