// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! topo-check - run topology rules over clusters described in JSON.
//!
//! Usage: `topo-check <graphs.json|-> [cluster_id ...]`
//!
//! Reads a JSON array of cluster graphs (from a file, or stdin for `-`),
//! checks the listed clusters (all of them by default) and prints the
//! reports as JSON on stdout. Exits with status 1 when any finding exists.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use stratum_topology::{MemoryGraphSource, MemoryReportSink, RuleCatalog, TopologyChecker};
use tokio::io::AsyncReadExt;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(input) = args.next() else {
        bail!("usage: topo-check <graphs.json|-> [cluster_id ...]");
    };
    let cluster_ids = args
        .map(|a| a.parse::<u64>().with_context(|| format!("invalid cluster id '{a}'")))
        .collect::<Result<Vec<_>>>()?;

    let source = if input == "-" {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        MemoryGraphSource::from_json(&text)?
    } else {
        MemoryGraphSource::from_file(&input).await?
    };
    let cluster_ids = if cluster_ids.is_empty() {
        source.cluster_ids().await
    } else {
        cluster_ids
    };
    info!(clusters = cluster_ids.len(), "Checking topology");

    let checker = TopologyChecker::new(Arc::new(source), RuleCatalog::standard());
    let sink = MemoryReportSink::new();
    let summary = checker.inspect(&cluster_ids, &sink).await;

    for (cluster_id, reason) in &summary.failed {
        error!(cluster_id, reason = %reason, "Cluster not checked");
    }
    println!("{}", serde_json::to_string_pretty(&sink.reports().await)?);

    if summary.findings > 0 || !summary.failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
