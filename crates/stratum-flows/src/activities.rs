// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activity executors bound to [`ActivityKey`]s.
//!
//! Every executor is a thin adapter: it reads typed kwargs, calls one
//! collaborator and maps the answer onto an [`ActivityOutcome`].
//! Collaborator errors surface as [`ActivityError::Collaborator`], which the
//! executor records as a failed node.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use strum::IntoEnumIterator;
use tracing::{debug, warn};

use stratum_pipeline::{
    ActivityError, ActivityExecutor, ActivityInput, ActivityOutcome, ExecutorRegistry,
};

use crate::collaborators::{
    CollaboratorError, MetadataWriter, RemoteExecution, RemoteRequest, TicketRequest,
    TicketService,
};
use crate::keys::{ActivityKey, MetaOp};
use crate::kwargs::{MetaKwargs, RemoteKwargs, SpawnTicketKwargs};

/// The services activities talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub remote: Arc<dyn RemoteExecution>,
    pub metadata: Arc<dyn MetadataWriter>,
    pub tickets: Arc<dyn TicketService>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// A registry with an executor for every [`ActivityKey`].
pub fn standard_registry(collaborators: &Collaborators) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    for key in ActivityKey::iter() {
        let executor: Arc<dyn ActivityExecutor> = match key {
            ActivityKey::TransFile
            | ActivityKey::DownloadBackupClient
            | ActivityKey::InstallNodemanPlugin
            | ActivityKey::ExecActuator
            | ActivityKey::CheckClientConn
            | ActivityKey::DropProxyUsersInBackend
            | ActivityKey::ClearMachine => Arc::new(RemoteActivity {
                remote: collaborators.remote.clone(),
            }),
            ActivityKey::ClusterStandardizeTransModule => Arc::new(MetadataActivity {
                writer: collaborators.metadata.clone(),
                op: Some(MetaOp::ClusterStandardizeTransModule),
            }),
            ActivityKey::DnsManage => Arc::new(MetadataActivity {
                writer: collaborators.metadata.clone(),
                op: Some(MetaOp::DnsRecycle),
            }),
            ActivityKey::DelCcServiceInstance => Arc::new(MetadataActivity {
                writer: collaborators.metadata.clone(),
                op: Some(MetaOp::DelServiceInstance),
            }),
            ActivityKey::DbMeta => Arc::new(MetadataActivity {
                writer: collaborators.metadata.clone(),
                op: None,
            }),
            ActivityKey::SpawnTicket => Arc::new(TicketActivity {
                tickets: collaborators.tickets.clone(),
            }),
        };
        registry.register(key, executor);
    }
    registry
}

fn collaborator_error(e: CollaboratorError) -> ActivityError {
    ActivityError::Collaborator(e.to_string())
}

/// Sends the payload to each ip in turn and stops at the first failure.
struct RemoteActivity {
    remote: Arc<dyn RemoteExecution>,
}

#[async_trait]
impl ActivityExecutor for RemoteActivity {
    async fn execute(&self, input: ActivityInput) -> Result<ActivityOutcome, ActivityError> {
        let kwargs: RemoteKwargs = input.kwargs_as()?;
        let params = match serde_json::to_value(&kwargs.params) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => {
                return Err(ActivityError::InvalidKwargs {
                    node: input.name.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let mut logs = Vec::with_capacity(kwargs.exec_ips.len());
        let mut artifacts = Map::new();
        for ip in &kwargs.exec_ips {
            let outcome = self
                .remote
                .execute(RemoteRequest {
                    target_ip: ip.clone(),
                    bk_cloud_id: kwargs.bk_cloud_id,
                    payload_ref: kwargs.payload,
                    kwargs: params.clone(),
                })
                .await
                .map_err(collaborator_error)?;
            logs.push(outcome.log);
            if !outcome.success {
                warn!(
                    run_id = %input.run_id,
                    node_id = %input.node_id,
                    target_ip = %ip,
                    payload = %kwargs.payload,
                    "Remote call failed"
                );
                return Ok(ActivityOutcome::failed(logs.join("\n")));
            }
            if !outcome.artifacts.is_empty() {
                artifacts.insert(ip.clone(), Value::Object(outcome.artifacts));
            }
        }

        debug!(
            node_id = %input.node_id,
            payload = %kwargs.payload,
            machines = kwargs.exec_ips.len(),
            "Remote calls finished"
        );
        let mut outcome = ActivityOutcome::succeeded().with_log(logs.join("\n"));
        if !artifacts.is_empty() {
            outcome = outcome.with_output("artifacts", Value::Object(artifacts));
        }
        Ok(outcome)
    }
}

/// Writes the node kwargs to the metadata store.
struct MetadataActivity {
    writer: Arc<dyn MetadataWriter>,
    /// Fixed op, or `None` to read it from kwargs.
    op: Option<MetaOp>,
}

#[async_trait]
impl ActivityExecutor for MetadataActivity {
    async fn execute(&self, input: ActivityInput) -> Result<ActivityOutcome, ActivityError> {
        let kwargs: MetaKwargs = input.kwargs_as()?;
        let op = self
            .op
            .or(kwargs.op)
            .ok_or_else(|| ActivityError::InvalidKwargs {
                node: input.name.clone(),
                reason: "missing field `op`".to_string(),
            })?;
        self.writer
            .record(op, &Value::Object(input.kwargs.clone()))
            .await
            .map_err(collaborator_error)?;
        Ok(ActivityOutcome::succeeded()
            .with_output("op", op.to_string())
            .with_log(format!("recorded {op} for cluster {}", kwargs.cluster_id)))
    }
}

struct TicketActivity {
    tickets: Arc<dyn TicketService>,
}

#[async_trait]
impl ActivityExecutor for TicketActivity {
    async fn execute(&self, input: ActivityInput) -> Result<ActivityOutcome, ActivityError> {
        let kwargs: SpawnTicketKwargs = input.kwargs_as()?;
        let ticket_id = self
            .tickets
            .create_ticket(TicketRequest {
                ticket_type: kwargs.ticket_type,
                creator: kwargs.creator,
                bk_biz_id: kwargs.bk_biz_id,
                remark: kwargs.remark,
                details: kwargs.details,
            })
            .await
            .map_err(collaborator_error)?;
        Ok(ActivityOutcome::succeeded()
            .with_output("ticket_id", ticket_id)
            .with_log(format!("created {} ticket {ticket_id}", kwargs.ticket_type)))
    }
}
