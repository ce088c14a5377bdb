// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! MySQL cluster standardization.
//!
//! Brings every machine of the selected clusters to the standard layout in
//! six stages, each one a sequential child of the root:
//!
//! 1. common file transfer, parallel per cloud
//! 2. sysinfo collection, parallel per cloud (optional)
//! 3. exporter config and CC module registration, parallel per cluster
//! 4. peripheral tool binaries, parallel per machine (optional)
//! 5. instance standardization, parallel per machine
//! 6. config push: crond first, then parallel per cluster with one
//!    sequential chain per machine (optional)
//!
//! A stage whose input is empty is still emitted as an empty sub-process.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use stratum_pipeline::{ActivitySpec, ExecutorRegistry, PipelineBuilder, SubProcess};
use stratum_topology::{ClusterGraph, ClusterType};

use crate::departs::{
    CONFIG_PUSH_ORDER, Departs, PeripheralTool, proxy_departs, storage_departs,
};
use crate::error::{FlowError, Result};
use crate::grouping::{Machine, MachineGroups, group_ips};
use crate::keys::{ACTUATOR_PACKAGE, ActivityKey, ActuatorPayload, MachineType, NODEMAN_PLUGINS};
use crate::kwargs::{ActuatorParams, MetaKwargs, RemoteKwargs};

/// Stage names, in execution order.
pub mod stage {
    pub const TRANS_COMMON_FILES: &str = "trans common files";
    pub const COLLECT_SYSINFO: &str = "collect sysinfo";
    pub const CC_TRANS_MODULE: &str = "cc trans module";
    pub const PREPARE_DEPARTS_BINARY: &str = "prepare departs binary";
    pub const INSTANCE_STANDARDIZE: &str = "instance standardize";
    pub const PUSH_CONFIG: &str = "push config";
}

fn enabled() -> bool {
    true
}

/// What to standardize and which stages to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizeRequest {
    pub bk_biz_id: u64,
    pub cluster_type: ClusterType,
    pub cluster_ids: Vec<u64>,
    #[serde(default = "PeripheralTool::all")]
    pub departs: Departs,
    #[serde(default = "enabled")]
    pub with_deploy_binary: bool,
    #[serde(default = "enabled")]
    pub with_push_config: bool,
    #[serde(default = "enabled")]
    pub with_collect_sysinfo: bool,
    #[serde(default = "enabled")]
    pub with_actuator: bool,
    #[serde(default = "enabled")]
    pub with_cc_standardize: bool,
    #[serde(default = "enabled")]
    pub with_instance_standardize: bool,
}

impl StandardizeRequest {
    /// Every stage on, every tool selected.
    pub fn new(bk_biz_id: u64, cluster_type: ClusterType, cluster_ids: Vec<u64>) -> Self {
        Self {
            bk_biz_id,
            cluster_type,
            cluster_ids,
            departs: PeripheralTool::all(),
            with_deploy_binary: true,
            with_push_config: true,
            with_collect_sysinfo: true,
            with_actuator: true,
            with_cc_standardize: true,
            with_instance_standardize: true,
        }
    }
}

/// Build a complete standardization tree for one run.
pub fn standardize_pipeline(
    run_id: &str,
    registry: Arc<ExecutorRegistry>,
    request: &StandardizeRequest,
    clusters: &[ClusterGraph],
) -> Result<SubProcess> {
    let mut root = PipelineBuilder::new(run_id, registry);
    add_standardize_stages(&mut root, request, clusters)?;
    Ok(root.build(format!("{} cluster standardize", request.cluster_type))?)
}

/// Append the standardization stages to `builder`.
///
/// `clusters` may hold more graphs than the request names; only the requested
/// ones are used and each must exist and match the request's cluster type.
pub fn add_standardize_stages(
    builder: &mut PipelineBuilder,
    request: &StandardizeRequest,
    clusters: &[ClusterGraph],
) -> Result<()> {
    let clusters = select_clusters(request, clusters)?;
    let groups = group_ips(&clusters);
    let mut departs = storage_departs(request.cluster_type, &request.departs);

    let with_backup_client = departs.remove(&PeripheralTool::BackupClient);
    let mut stages = vec![trans_common_files(
        builder,
        &groups,
        request.with_actuator,
        with_backup_client,
    )?];
    if request.with_collect_sysinfo {
        stages.push(collect_sysinfo(builder, &groups)?);
    }
    if request.with_cc_standardize {
        stages.push(cc_trans_module(builder, request, &clusters, &groups)?);
    }
    if request.with_deploy_binary {
        stages.push(prepare_departs_binary(
            builder,
            request.cluster_type,
            &departs,
            &groups,
        )?);
    }
    if request.with_instance_standardize {
        stages.push(instance_standardize(builder, request.cluster_type, &groups)?);
    }
    if request.with_push_config && departs.iter().any(|t| t.has_config()) {
        stages.push(push_config(builder, request, &departs, &clusters, &groups)?);
    }
    for sub in stages {
        builder.add_sub_pipeline(sub)?;
    }

    info!(
        run_id = %builder.run_id(),
        cluster_type = %request.cluster_type,
        clusters = clusters.len(),
        stages = builder.len(),
        "Planned cluster standardization"
    );
    Ok(())
}

fn select_clusters(
    request: &StandardizeRequest,
    clusters: &[ClusterGraph],
) -> Result<Vec<ClusterGraph>> {
    request
        .cluster_ids
        .iter()
        .map(|&cluster_id| {
            let cluster = clusters
                .iter()
                .find(|c| c.cluster_id == cluster_id)
                .ok_or(FlowError::ClusterNotFound { cluster_id })?;
            if cluster.cluster_type != request.cluster_type {
                return Err(FlowError::ClusterTypeMismatch {
                    cluster_id,
                    expected: request.cluster_type,
                    actual: cluster.cluster_type,
                });
            }
            Ok(cluster.clone())
        })
        .collect()
}

// ============================================================================
// Stages
// ============================================================================

fn trans_common_files(
    parent: &PipelineBuilder,
    groups: &MachineGroups,
    with_actuator: bool,
    with_backup_client: bool,
) -> Result<SubProcess> {
    let mut scope = parent.sub_builder();
    let mut per_cloud = Vec::new();

    for (cloud, ips) in groups.ips_by_cloud() {
        let mut specs = Vec::new();
        if with_actuator {
            specs.push(
                ActivitySpec::new("trans actuator", ActivityKey::TransFile).kwargs(
                    &RemoteKwargs::new(cloud, ips.clone(), ActuatorPayload::TransFile).params(
                        ActuatorParams {
                            files: vec![ACTUATOR_PACKAGE.to_string()],
                            ..ActuatorParams::default()
                        },
                    ),
                ),
            );
        }
        if with_backup_client {
            specs.push(
                ActivitySpec::new("download backup client", ActivityKey::DownloadBackupClient)
                    .kwargs(&RemoteKwargs::new(
                        cloud,
                        ips.clone(),
                        ActuatorPayload::DownloadBackupClient,
                    )),
            );
        }
        for plugin in NODEMAN_PLUGINS {
            specs.push(
                ActivitySpec::new(format!("install {plugin}"), ActivityKey::InstallNodemanPlugin)
                    .kwargs(
                        &RemoteKwargs::new(cloud, ips.clone(), ActuatorPayload::InstallNodemanPlugin)
                            .params(ActuatorParams {
                                plugin: Some(plugin.to_string()),
                                ..ActuatorParams::default()
                            }),
                    ),
            );
        }

        let mut sub = scope.sub_builder();
        sub.add_parallel_activities(specs)?;
        per_cloud.push(sub.build(format!("cloud {cloud}"))?);
    }

    scope.add_parallel_sub_pipelines(per_cloud)?;
    Ok(scope.build(stage::TRANS_COMMON_FILES)?)
}

fn collect_sysinfo(parent: &PipelineBuilder, groups: &MachineGroups) -> Result<SubProcess> {
    let mut scope = parent.sub_builder();
    let mut per_cloud = Vec::new();

    for (cloud, ips) in groups.ips_by_cloud() {
        let mut sub = scope.sub_builder();
        sub.add_parallel_activities(ips.iter().map(|ip| {
            ActivitySpec::new(format!("collect sysinfo {ip}"), ActivityKey::ExecActuator)
                .kwargs(&RemoteKwargs::on(cloud, ip, ActuatorPayload::CollectSysinfo))
        }))?;
        per_cloud.push(sub.build(format!("cloud {cloud}"))?);
    }

    scope.add_parallel_sub_pipelines(per_cloud)?;
    Ok(scope.build(stage::COLLECT_SYSINFO)?)
}

fn cc_trans_module(
    parent: &PipelineBuilder,
    request: &StandardizeRequest,
    clusters: &[ClusterGraph],
    groups: &MachineGroups,
) -> Result<SubProcess> {
    let mut scope = parent.sub_builder();

    let mut exporters = Vec::new();
    let layers = [
        ("storage", groups.storage_machines().collect::<Vec<_>>(), MachineType::storage_of(request.cluster_type)),
        ("proxy", groups.proxy_machines().collect::<Vec<_>>(), MachineType::proxy_of(request.cluster_type)),
    ];
    for (layer, machines, machine_type) in layers {
        let Some(machine_type) = machine_type else {
            continue;
        };
        let mut sub = scope.sub_builder();
        sub.add_parallel_activities(machines.iter().map(|m| {
            machine_spec(
                format!("push exporter config {}", m.ip),
                m,
                ActuatorPayload::PushExporterCnf,
                ActuatorParams {
                    machine_type: Some(machine_type),
                    port_list: m.ports.to_vec(),
                    ..ActuatorParams::default()
                },
            )
        }))?;
        exporters.push(sub.build(format!("{layer} exporter config"))?);
    }
    scope.add_parallel_sub_pipelines(exporters)?;

    scope.add_parallel_activities(clusters.iter().map(|c| {
        ActivitySpec::new(
            format!("trans module {}", display_name(c)),
            ActivityKey::ClusterStandardizeTransModule,
        )
        .kwargs(&MetaKwargs::cluster(request.bk_biz_id, c.cluster_id))
    }))?;

    Ok(scope.build(stage::CC_TRANS_MODULE)?)
}

fn prepare_departs_binary(
    parent: &PipelineBuilder,
    cluster_type: ClusterType,
    departs: &Departs,
    groups: &MachineGroups,
) -> Result<SubProcess> {
    let mut scope = parent.sub_builder();
    if departs.is_empty() {
        return Ok(scope.build(stage::PREPARE_DEPARTS_BINARY)?);
    }

    let files: Vec<String> = departs.iter().map(|t| t.package()).collect();
    scope.add_parallel_activities(groups.ips_by_cloud().into_iter().map(|(cloud, ips)| {
        ActivitySpec::new(format!("trans departs to cloud {cloud}"), ActivityKey::TransFile)
            .kwargs(
                &RemoteKwargs::new(cloud, ips, ActuatorPayload::TransFile).params(ActuatorParams {
                    files: files.clone(),
                    ..ActuatorParams::default()
                }),
            )
    }))?;

    let mut specs = Vec::new();
    if let Some(machine_type) = MachineType::storage_of(cluster_type) {
        for m in groups.storage_machines() {
            specs.push(prepare_binary_spec(&m, machine_type, departs));
        }
    }
    let proxy_tools = proxy_departs(cluster_type, departs);
    if let Some(machine_type) = MachineType::proxy_of(cluster_type)
        && !proxy_tools.is_empty()
    {
        for m in groups.proxy_machines() {
            specs.push(prepare_binary_spec(&m, machine_type, &proxy_tools));
        }
    }
    scope.add_parallel_activities(specs)?;

    Ok(scope.build(stage::PREPARE_DEPARTS_BINARY)?)
}

fn prepare_binary_spec(m: &Machine<'_>, machine_type: MachineType, departs: &Departs) -> ActivitySpec {
    machine_spec(
        format!("prepare departs binary {}", m.ip),
        m,
        ActuatorPayload::PreparePeripheraltoolsBinary,
        ActuatorParams {
            machine_type: Some(machine_type),
            departs: departs.iter().copied().collect(),
            ..ActuatorParams::default()
        },
    )
}

fn instance_standardize(
    parent: &PipelineBuilder,
    cluster_type: ClusterType,
    groups: &MachineGroups,
) -> Result<SubProcess> {
    let mut scope = parent.sub_builder();
    let mut specs = Vec::new();

    if let Some(machine_type) = MachineType::storage_of(cluster_type) {
        for m in groups.storage_machines() {
            specs.push(standardize_spec(&m, ActuatorPayload::StandardizeMysql, machine_type));
        }
    }
    match MachineType::proxy_of(cluster_type) {
        Some(MachineType::Spider) => {
            for m in groups.proxy_machines() {
                specs.push(standardize_spec(&m, ActuatorPayload::StandardizeMysql, MachineType::Spider));
            }
        }
        Some(machine_type) => {
            for m in groups.proxy_machines() {
                specs.push(standardize_spec(&m, ActuatorPayload::StandardizeProxy, machine_type));
            }
        }
        None => {}
    }
    scope.add_parallel_activities(specs)?;

    Ok(scope.build(stage::INSTANCE_STANDARDIZE)?)
}

fn standardize_spec(m: &Machine<'_>, payload: ActuatorPayload, machine_type: MachineType) -> ActivitySpec {
    machine_spec(
        format!("{payload} {}", m.ip),
        m,
        payload,
        ActuatorParams {
            machine_type: Some(machine_type),
            port_list: m.ports.to_vec(),
            ..ActuatorParams::default()
        },
    )
}

fn push_config(
    parent: &PipelineBuilder,
    request: &StandardizeRequest,
    departs: &Departs,
    clusters: &[ClusterGraph],
    groups: &MachineGroups,
) -> Result<SubProcess> {
    let mut scope = parent.sub_builder();

    // Crond has to run before any tool that registers jobs with it.
    if departs.contains(&PeripheralTool::MysqlCrond) {
        let mut specs = Vec::new();
        let layers = [
            (groups.storage_machines().collect::<Vec<_>>(), MachineType::storage_of(request.cluster_type)),
            (groups.proxy_machines().collect::<Vec<_>>(), MachineType::proxy_of(request.cluster_type)),
        ];
        for (machines, machine_type) in layers {
            let Some(machine_type) = machine_type else {
                continue;
            };
            for m in &machines {
                specs.push(machine_spec(
                    format!("push {} config {}", PeripheralTool::MysqlCrond, m.ip),
                    m,
                    ActuatorPayload::PushMysqlCrondConfig,
                    ActuatorParams {
                        bk_biz_id: Some(request.bk_biz_id),
                        machine_type: Some(machine_type),
                        ..ActuatorParams::default()
                    },
                ));
            }
        }
        scope.add_parallel_activities(specs)?;
    }

    if departs.iter().any(|t| CONFIG_PUSH_ORDER.contains(t)) {
        let mut per_cluster = Vec::new();
        for cluster in clusters {
            per_cluster.push(push_cluster_config(&scope, request, departs, cluster)?);
        }
        scope.add_parallel_sub_pipelines(per_cluster)?;
    }

    Ok(scope.build(stage::PUSH_CONFIG)?)
}

fn push_cluster_config(
    parent: &PipelineBuilder,
    request: &StandardizeRequest,
    departs: &Departs,
    cluster: &ClusterGraph,
) -> Result<SubProcess> {
    let groups = group_ips(std::slice::from_ref(cluster));
    let storage_tools = storage_departs(cluster.cluster_type, departs);
    let proxy_tools = proxy_departs(cluster.cluster_type, departs);

    let mut layers = Vec::new();
    if let Some(machine_type) = MachineType::storage_of(cluster.cluster_type)
        && storage_tools.iter().any(|t| CONFIG_PUSH_ORDER.contains(t))
    {
        let machines: Vec<_> = groups.storage_machines().collect();
        layers.push(("storage", machines, machine_type, storage_tools));
    }
    if let Some(machine_type) = MachineType::proxy_of(cluster.cluster_type)
        && proxy_tools.iter().any(|t| CONFIG_PUSH_ORDER.contains(t))
    {
        let machines: Vec<_> = groups.proxy_machines().collect();
        layers.push(("proxy", machines, machine_type, proxy_tools));
    }

    let mut scope = parent.sub_builder();
    let mut layer_subs = Vec::new();
    for (layer, machines, machine_type, tools) in layers {
        let mut layer_scope = scope.sub_builder();
        let mut per_machine = Vec::new();
        for m in &machines {
            let mut chain = layer_scope.sub_builder();
            for tool in CONFIG_PUSH_ORDER.iter().filter(|t| tools.contains(*t)) {
                let Some(payload) = config_payload(*tool) else {
                    continue;
                };
                chain.add_activity(machine_spec(
                    format!("push {tool} config {}", m.ip),
                    m,
                    payload,
                    ActuatorParams {
                        bk_biz_id: Some(request.bk_biz_id),
                        cluster_id: Some(cluster.cluster_id),
                        cluster_type: Some(cluster.cluster_type),
                        immute_domain: Some(cluster.name.clone()),
                        db_module_id: Some(cluster.db_module_id),
                        machine_type: Some(machine_type),
                        port_list: m.ports.to_vec(),
                        ..ActuatorParams::default()
                    },
                ))?;
            }
            per_machine.push(chain.build(m.ip.to_string())?);
        }
        layer_scope.add_parallel_sub_pipelines(per_machine)?;
        layer_subs.push(layer_scope.build(layer)?);
    }
    scope.add_parallel_sub_pipelines(layer_subs)?;

    Ok(scope.build(format!("cluster {}", display_name(cluster)))?)
}

fn config_payload(tool: PeripheralTool) -> Option<ActuatorPayload> {
    match tool {
        PeripheralTool::MysqlMonitor => Some(ActuatorPayload::PushMysqlMonitorConfig),
        PeripheralTool::MysqlDbbackup => Some(ActuatorPayload::PushMysqlDbbackupConfig),
        PeripheralTool::MysqlChecksum => Some(ActuatorPayload::PushMysqlChecksumConfig),
        PeripheralTool::RotateBinlog => Some(ActuatorPayload::PushMysqlRotatebinlogConfig),
        PeripheralTool::MysqlCrond => Some(ActuatorPayload::PushMysqlCrondConfig),
        PeripheralTool::BackupClient | PeripheralTool::DbaToolkit => None,
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn machine_spec(
    name: String,
    m: &Machine<'_>,
    payload: ActuatorPayload,
    params: ActuatorParams,
) -> ActivitySpec {
    ActivitySpec::new(name, ActivityKey::ExecActuator)
        .kwargs(&RemoteKwargs::on(m.bk_cloud_id, m.ip, payload).params(params))
}

fn display_name(cluster: &ClusterGraph) -> String {
    if cluster.name.is_empty() {
        format!("#{}", cluster.cluster_id)
    } else {
        cluster.name.clone()
    }
}
