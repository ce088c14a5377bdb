// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Proxy reduction for TenDBHA clusters.
//!
//! Each listed machine is drained from every cluster it serves and then
//! wiped. Per machine:
//!
//! 1. transfer the actuator
//! 2. per cluster in parallel, one sequential chain: client connection
//!    check (optional), DNS recycle, backend user drop, manual confirmation,
//!    service instance removal, config clear, uninstall, metadata update
//! 3. clear the machine
//!
//! Planning fails when a cluster would keep fewer than
//! [`MIN_PROXY_COUNT`] proxies after every listed machine is removed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use stratum_pipeline::{ActivitySpec, ExecutorRegistry, PipelineBuilder, SubProcess};
use stratum_topology::{ClusterGraph, InnerRole};

use crate::error::{FlowError, Result};
use crate::keys::{ACTUATOR_PACKAGE, ActivityKey, ActuatorPayload, MIN_PROXY_COUNT, MetaOp};
use crate::kwargs::{ActuatorParams, MetaKwargs, RemoteKwargs};

/// Name of the manual confirmation node in every cluster chain.
pub const MANUAL_CONFIRMATION: &str = "manual confirmation";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRef {
    pub ip: String,
    #[serde(default)]
    pub bk_cloud_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyReduceInfo {
    pub origin_proxy_ip: HostRef,
    pub cluster_ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyReduceRequest {
    pub bk_biz_id: u64,
    /// Check that clients have left the proxy before recycling it.
    #[serde(default)]
    pub is_safe: bool,
    pub infos: Vec<ProxyReduceInfo>,
    /// Users asked to confirm; falls back to the run's `operators` global.
    #[serde(default)]
    pub operators: Vec<String>,
}

/// Build a complete proxy reduction tree for one run.
pub fn proxy_reduce_pipeline(
    run_id: &str,
    registry: Arc<ExecutorRegistry>,
    request: &ProxyReduceRequest,
    clusters: &[ClusterGraph],
) -> Result<SubProcess> {
    let mut root = PipelineBuilder::new(run_id, registry);
    add_proxy_reduce(&mut root, request, clusters)?;
    Ok(root.build("tendbha proxy reduce")?)
}

/// Append one parallel group with a sub-process per machine to `builder`.
pub fn add_proxy_reduce(
    builder: &mut PipelineBuilder,
    request: &ProxyReduceRequest,
    clusters: &[ClusterGraph],
) -> Result<()> {
    if request.infos.is_empty() {
        return Err(FlowError::EmptyRequest);
    }
    check_remaining_proxies(request, clusters)?;

    let mut machines = Vec::with_capacity(request.infos.len());
    for info in &request.infos {
        machines.push(reduce_machine(builder, request, info, clusters)?);
    }
    builder.add_parallel_sub_pipelines(machines)?;

    info!(
        run_id = %builder.run_id(),
        machines = request.infos.len(),
        "Planned proxy reduction"
    );
    Ok(())
}

fn find_cluster(clusters: &[ClusterGraph], cluster_id: u64) -> Result<&ClusterGraph> {
    clusters
        .iter()
        .find(|c| c.cluster_id == cluster_id)
        .ok_or(FlowError::ClusterNotFound { cluster_id })
}

/// Reject the request if any cluster would drop below the proxy minimum.
fn check_remaining_proxies(request: &ProxyReduceRequest, clusters: &[ClusterGraph]) -> Result<()> {
    let mut removed: BTreeMap<u64, BTreeSet<&str>> = BTreeMap::new();
    for info in &request.infos {
        for &cluster_id in &info.cluster_ids {
            let cluster = find_cluster(clusters, cluster_id)?;
            let ip = info.origin_proxy_ip.ip.as_str();
            if !cluster.proxies.iter().any(|p| p.ip == ip) {
                return Err(FlowError::ProxyNotInCluster {
                    ip: ip.to_string(),
                    cluster_id,
                });
            }
            removed.entry(cluster_id).or_default().insert(ip);
        }
    }

    for (cluster_id, ips) in removed {
        let cluster = find_cluster(clusters, cluster_id)?;
        let remaining = cluster
            .proxies
            .iter()
            .filter(|p| !ips.contains(p.ip.as_str()))
            .count();
        if remaining < MIN_PROXY_COUNT {
            return Err(FlowError::NotEnoughProxies {
                cluster_id,
                remaining,
                required: MIN_PROXY_COUNT,
            });
        }
    }
    Ok(())
}

fn reduce_machine(
    parent: &PipelineBuilder,
    request: &ProxyReduceRequest,
    info: &ProxyReduceInfo,
    clusters: &[ClusterGraph],
) -> Result<SubProcess> {
    let host = &info.origin_proxy_ip;
    let mut scope = parent.sub_builder();

    scope.add_activity(
        ActivitySpec::new("trans actuator", ActivityKey::TransFile).kwargs(
            &RemoteKwargs::on(host.bk_cloud_id, &host.ip, ActuatorPayload::TransFile).params(
                ActuatorParams {
                    files: vec![ACTUATOR_PACKAGE.to_string()],
                    ..ActuatorParams::default()
                },
            ),
        ),
    )?;

    let mut per_cluster = Vec::with_capacity(info.cluster_ids.len());
    for &cluster_id in &info.cluster_ids {
        let cluster = find_cluster(clusters, cluster_id)?;
        per_cluster.push(reduce_cluster(&scope, request, host, cluster)?);
    }
    scope.add_parallel_sub_pipelines(per_cluster)?;

    scope.add_activity(
        ActivitySpec::new("clear machine", ActivityKey::ClearMachine).kwargs(&RemoteKwargs::on(
            host.bk_cloud_id,
            &host.ip,
            ActuatorPayload::ClearMachine,
        )),
    )?;

    Ok(scope.build(format!("reduce proxy {}", host.ip))?)
}

fn reduce_cluster(
    parent: &PipelineBuilder,
    request: &ProxyReduceRequest,
    host: &HostRef,
    cluster: &ClusterGraph,
) -> Result<SubProcess> {
    let proxies: Vec<_> = cluster.proxies.iter().filter(|p| p.ip == host.ip).collect();
    let ports: Vec<u16> = proxies.iter().map(|p| p.port).collect();
    let mut chain = parent.sub_builder();

    if request.is_safe {
        let check_instances = proxies
            .iter()
            .map(|p| format!("{}:{}", p.ip, p.admin_port.unwrap_or(p.port)))
            .collect();
        chain.add_activity(
            ActivitySpec::new("check client connections", ActivityKey::CheckClientConn).kwargs(
                &RemoteKwargs::on(host.bk_cloud_id, &host.ip, ActuatorPayload::CheckClientConn)
                    .params(ActuatorParams {
                        check_instances,
                        ..ActuatorParams::default()
                    }),
            ),
        )?;
    }

    let meta = MetaKwargs {
        bk_cloud_id: host.bk_cloud_id,
        ip: Some(host.ip.clone()),
        port_list: ports.clone(),
        ..MetaKwargs::cluster(request.bk_biz_id, cluster.cluster_id)
    };
    chain.add_activity(ActivitySpec::new("recycle dns", ActivityKey::DnsManage).kwargs(&meta))?;

    let mut backends: Vec<String> = cluster
        .storages_with_role(InnerRole::Master)
        .map(|s| s.ip.clone())
        .collect();
    backends.sort();
    backends.dedup();
    chain.add_activity(
        ActivitySpec::new("drop proxy users in backend", ActivityKey::DropProxyUsersInBackend)
            .kwargs(
                &RemoteKwargs::new(cluster.bk_cloud_id, backends, ActuatorPayload::DropProxyUsers)
                    .params(ActuatorParams {
                        cluster_id: Some(cluster.cluster_id),
                        origin_proxy_host: Some(host.ip.clone()),
                        ..ActuatorParams::default()
                    }),
            ),
    )?;

    let pause = if request.operators.is_empty() {
        ActivitySpec::pause(MANUAL_CONFIRMATION)
    } else {
        ActivitySpec::pause(MANUAL_CONFIRMATION).kwargs(&json!({ "operators": request.operators }))
    };
    chain.add_activity(pause)?;

    chain.add_activity(
        ActivitySpec::new("delete service instance", ActivityKey::DelCcServiceInstance)
            .kwargs(&meta),
    )?;
    for (name, payload) in [
        ("clear surrounding config", ActuatorPayload::ClearSurroundingConfig),
        ("uninstall proxy", ActuatorPayload::UninstallProxy),
    ] {
        chain.add_activity(
            ActivitySpec::new(name, ActivityKey::ExecActuator).kwargs(
                &RemoteKwargs::on(host.bk_cloud_id, &host.ip, payload).params(ActuatorParams {
                    cluster_id: Some(cluster.cluster_id),
                    port_list: ports.clone(),
                    ..ActuatorParams::default()
                }),
            ),
        )?;
    }
    chain.add_activity(
        ActivitySpec::new("update metadata", ActivityKey::DbMeta).kwargs(&MetaKwargs {
            op: Some(MetaOp::MysqlProxyReduce),
            ..meta
        }),
    )?;

    let name = if cluster.name.is_empty() {
        format!("cluster #{}", cluster.cluster_id)
    } else {
        format!("cluster {}", cluster.name)
    };
    Ok(chain.build(name)?)
}
