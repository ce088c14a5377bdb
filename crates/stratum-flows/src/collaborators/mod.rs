// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! External services the flows call into.
//!
//! Only the narrow contracts live here; transports (agents, DNS, CMDB,
//! ticketing) are outside this crate. In-process implementations for dry
//! runs and tests are in [`memory`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::keys::{ActuatorPayload, MetaOp, TicketType};

pub mod memory;

pub use memory::{DryRunRemote, MemoryMetadata, MemoryTickets, RecordingRemote};

#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    /// The service could not be reached; the call may be repeated.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// One remote call against one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRequest {
    pub target_ip: String,
    pub bk_cloud_id: u64,
    pub payload_ref: ActuatorPayload,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteOutcome {
    pub success: bool,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub artifacts: Map<String, Value>,
}

/// Dispatches payloads to managed machines.
///
/// A payload may be sent again after a retry or a crash, so the remote side
/// is expected to check current state before mutating it.
#[async_trait]
pub trait RemoteExecution: Send + Sync {
    async fn execute(&self, request: RemoteRequest) -> Result<RemoteOutcome, CollaboratorError>;
}

/// Records orchestration outcomes in the metadata store.
#[async_trait]
pub trait MetadataWriter: Send + Sync {
    async fn record(&self, op: MetaOp, payload: &Value) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRequest {
    pub ticket_type: TicketType,
    pub creator: String,
    pub bk_biz_id: u64,
    pub remark: String,
    pub details: Value,
}

/// Creates follow-up tickets.
#[async_trait]
pub trait TicketService: Send + Sync {
    /// Returns the id of the new ticket.
    async fn create_ticket(&self, request: TicketRequest) -> Result<u64, CollaboratorError>;
}
