// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! stratum-plan - plan, and optionally dry-run, a cluster standardization.
//!
//! Usage: `stratum-plan <plan.json|-> [--execute] [--skip-preflight]`
//!
//! The input document holds a standardization request and the cluster graphs
//! it refers to:
//!
//! ```json
//! {"request": {"bk_biz_id": 3, "cluster_type": "tendbha", "cluster_ids": [1]},
//!  "clusters": [{"cluster_id": 1, "cluster_type": "tendbha", "...": "..."}]}
//! ```
//!
//! Without `--execute` the planned tree is printed as JSON. With it, the tree
//! runs against a dry-run remote and the SQLite store named by
//! `STRATUM_DATABASE_URL`, and the run result is printed instead.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stratum_core::persistence::SqlitePersistence;
use stratum_core::{Config, PipelineExecutor, RunStatus};
use stratum_flows::{
    Collaborators, DryRunRemote, MemoryMetadata, MemoryTickets, StandardizeRequest, preflight,
    standard_registry, standardize_pipeline,
};
use stratum_pipeline::ExecutionContext;
use stratum_topology::{ClusterGraph, MemoryGraphSource, RuleCatalog, TopologyChecker};

#[derive(Debug, Deserialize)]
struct PlanDocument {
    request: StandardizeRequest,
    #[serde(default)]
    clusters: Vec<ClusterGraph>,
}

struct Args {
    input: String,
    execute: bool,
    skip_preflight: bool,
}

fn parse_args() -> Result<Args> {
    let mut input = None;
    let mut execute = false;
    let mut skip_preflight = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--execute" => execute = true,
            "--skip-preflight" => skip_preflight = true,
            flag if flag.starts_with("--") => bail!("unknown flag '{flag}'"),
            _ if input.is_none() => input = Some(arg),
            _ => bail!("unexpected argument '{arg}'"),
        }
    }
    let Some(input) = input else {
        bail!("usage: stratum-plan <plan.json|-> [--execute] [--skip-preflight]");
    };
    Ok(Args {
        input,
        execute,
        skip_preflight,
    })
}

async fn read_document(input: &str) -> Result<PlanDocument> {
    let text = if input == "-" {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        text
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("failed to read {input}"))?
    };
    serde_json::from_str(&text).context("invalid plan document")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = parse_args()?;
    let document = read_document(&args.input).await?;
    let request = document.request;

    if !args.skip_preflight {
        let checker = TopologyChecker::new(
            Arc::new(MemoryGraphSource::from_graphs(document.clusters.clone())),
            RuleCatalog::standard(),
        );
        preflight(&checker, &request.cluster_ids).await?;
    }

    let registry = Arc::new(standard_registry(&Collaborators {
        remote: Arc::new(DryRunRemote),
        metadata: Arc::new(MemoryMetadata::new()),
        tickets: Arc::new(MemoryTickets::new()),
    }));
    let run_id = uuid::Uuid::new_v4().to_string();
    let tree = standardize_pipeline(&run_id, registry.clone(), &request, &document.clusters)?;
    info!(run_id = %run_id, activities = tree.activities().len(), "Planned");

    if !args.execute {
        println!("{}", serde_json::to_string_pretty(&tree)?);
        return Ok(());
    }

    let config = Config::from_env()?;
    let persistence = match config.sqlite_path() {
        Some(path) => SqlitePersistence::from_path(path).await?,
        None => SqlitePersistence::in_memory().await?,
    };
    let executor = PipelineExecutor::builder()
        .config(&config)
        .persistence(Arc::new(persistence))
        .registry(registry)
        .build()?;

    let result = executor
        .run(&run_id, tree, ExecutionContext::from_params(&request)?)
        .await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.status != RunStatus::Succeeded {
        warn!(run_id = %run_id, status = result.status.as_str(), "Run did not succeed");
        std::process::exit(1);
    }
    Ok(())
}
