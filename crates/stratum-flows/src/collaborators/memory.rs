// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process collaborators for dry runs and tests.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{
    CollaboratorError, MetadataWriter, RemoteExecution, RemoteOutcome, RemoteRequest,
    TicketRequest, TicketService,
};
use crate::keys::MetaOp;

/// Logs every request and reports success without touching any machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunRemote;

#[async_trait]
impl RemoteExecution for DryRunRemote {
    async fn execute(&self, request: RemoteRequest) -> Result<RemoteOutcome, CollaboratorError> {
        tracing::info!(
            target_ip = %request.target_ip,
            bk_cloud_id = request.bk_cloud_id,
            payload = %request.payload_ref,
            "Dry run remote call"
        );
        Ok(RemoteOutcome {
            success: true,
            log: format!("dry run: {} on {}", request.payload_ref, request.target_ip),
            ..RemoteOutcome::default()
        })
    }
}

/// Keeps every request; calls against a failing ip report failure.
#[derive(Debug, Default)]
pub struct RecordingRemote {
    requests: Mutex<Vec<RemoteRequest>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_on(&self, ip: impl Into<String>) {
        self.failing.lock().await.insert(ip.into());
    }

    pub async fn heal(&self, ip: &str) {
        self.failing.lock().await.remove(ip);
    }

    pub async fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl RemoteExecution for RecordingRemote {
    async fn execute(&self, request: RemoteRequest) -> Result<RemoteOutcome, CollaboratorError> {
        let failing = self.failing.lock().await.contains(&request.target_ip);
        let outcome = RemoteOutcome {
            success: !failing,
            log: format!(
                "{} on {}: {}",
                request.payload_ref,
                request.target_ip,
                if failing { "failed" } else { "ok" }
            ),
            ..RemoteOutcome::default()
        };
        self.requests.lock().await.push(request);
        Ok(outcome)
    }
}

#[derive(Debug, Default)]
pub struct MemoryMetadata {
    records: Mutex<Vec<(MetaOp, Value)>>,
}

impl MemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<(MetaOp, Value)> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl MetadataWriter for MemoryMetadata {
    async fn record(&self, op: MetaOp, payload: &Value) -> Result<(), CollaboratorError> {
        self.records.lock().await.push((op, payload.clone()));
        Ok(())
    }
}

/// Hands out sequential ticket ids starting at 1.
#[derive(Debug, Default)]
pub struct MemoryTickets {
    tickets: Mutex<Vec<TicketRequest>>,
}

impl MemoryTickets {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn tickets(&self) -> Vec<TicketRequest> {
        self.tickets.lock().await.clone()
    }
}

#[async_trait]
impl TicketService for MemoryTickets {
    async fn create_ticket(&self, request: TicketRequest) -> Result<u64, CollaboratorError> {
        let mut tickets = self.tickets.lock().await;
        tickets.push(request);
        Ok(tickets.len() as u64)
    }
}
