// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Manual retry of failed nodes.

mod common;

use std::sync::atomic::Ordering;

use common::*;
use serde_json::json;
use stratum_core::{NodeStatus, RunStatus};
use stratum_pipeline::{ActivitySpec, ExecutionContext, NodeId, PipelineBuilder};

#[tokio::test]
async fn test_retry_failed_node_resumes_without_rerunning_upstream() {
    let h = Harness::new();
    let mut b = PipelineBuilder::new("manual", h.registry.clone());
    b.add_activity(ActivitySpec::new("A", "record").kwargs(&json!({ "value": 1 })))
        .unwrap();
    b.add_activity(ActivitySpec::new("B", "toggle")).unwrap();
    b.add_activity(ActivitySpec::new("C", "record").kwargs(&json!({ "value": 3 })))
        .unwrap();
    let tree = b.build("root").unwrap();
    let executor = h.memory_executor();

    let failed = executor
        .run("manual", tree.clone(), ExecutionContext::default())
        .await
        .unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    let b_id = node_named(&tree, "B");
    assert_eq!(failed.failed_nodes, vec![b_id.clone()]);

    h.healthy.store(true, Ordering::SeqCst);
    let result = executor.retry_node("manual", &b_id).await.unwrap();

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(h.dispatched(), vec!["A", "B", "B", "C"]);
    assert_eq!(outputs_by_name(&tree, &result)["B"]["value"], json!("fixed"));

    let state = executor.status("manual").await.unwrap();
    assert_eq!(state.nodes[&b_id].attempts, 2);
    assert_eq!(state.nodes[&node_named(&tree, "A")].attempts, 1);
}

#[tokio::test]
async fn test_retry_preconditions() {
    let h = Harness::new();
    let mut b = PipelineBuilder::new("pre", h.registry.clone());
    b.add_activity(ActivitySpec::new("A", "record")).unwrap();
    b.add_activity(ActivitySpec::new("B", "fail")).unwrap();
    let tree = b.build("root").unwrap();
    let executor = h.memory_executor();

    let err = executor
        .retry_node("missing", &NodeId::from("n1"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "RUN_NOT_FOUND");

    executor
        .run("pre", tree.clone(), ExecutionContext::default())
        .await
        .unwrap();

    let err = executor
        .retry_node("pre", &node_named(&tree, "A"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_NODE_STATE");

    let err = executor
        .retry_node("pre", &NodeId::from("no-such-node"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NODE_NOT_FOUND");

    // Nothing was dispatched by the rejected retries.
    assert_eq!(h.dispatched(), vec!["A", "B"]);
}

#[tokio::test]
async fn test_retry_on_succeeded_run_rejected() {
    let h = Harness::new();
    let mut b = PipelineBuilder::new("ok", h.registry.clone());
    b.add_activity(ActivitySpec::new("A", "record")).unwrap();
    let tree = b.build("root").unwrap();
    let executor = h.memory_executor();
    executor
        .run("ok", tree.clone(), ExecutionContext::default())
        .await
        .unwrap();

    let err = executor
        .retry_node("ok", &node_named(&tree, "A"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_RUN_STATE");
}

#[tokio::test]
async fn test_retry_one_parallel_branch_leaves_the_other_failed() {
    let h = Harness::new();
    let mut root = PipelineBuilder::new("branches", h.registry.clone());
    let left = {
        let mut sub = root.sub_builder();
        sub.add_activity(ActivitySpec::new("L1", "record")).unwrap();
        sub.add_activity(ActivitySpec::new("L2", "toggle")).unwrap();
        sub.build("left").unwrap()
    };
    let right = {
        let mut sub = root.sub_builder();
        sub.add_activity(ActivitySpec::new("R1", "fail")).unwrap();
        sub.build("right").unwrap()
    };
    root.add_parallel_sub_pipelines(vec![left, right]).unwrap();
    root.add_activity(ActivitySpec::new("after", "record")).unwrap();
    let tree = root.build("root").unwrap();
    let executor = h.memory_executor();

    let first = executor
        .run("branches", tree.clone(), ExecutionContext::default())
        .await
        .unwrap();
    assert_eq!(first.failed_nodes.len(), 2);

    h.healthy.store(true, Ordering::SeqCst);
    let result = executor
        .retry_node("branches", &node_named(&tree, "L2"))
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.failed_nodes, vec![node_named(&tree, "R1")]);
    assert_eq!(h.count("L1"), 1);
    assert_eq!(h.count("L2"), 2);
    assert_eq!(h.count("R1"), 1);
    assert_eq!(h.count("after"), 0);

    let state = executor.status("branches").await.unwrap();
    assert_eq!(
        state.nodes[&node_named(&tree, "L2")].status,
        NodeStatus::Succeeded
    );
}

#[tokio::test]
async fn test_retry_subprocess_reruns_its_whole_subtree() {
    let h = Harness::new();
    let mut root = PipelineBuilder::new("subtree", h.registry.clone());
    let mut sub = root.sub_builder();
    sub.add_activity(ActivitySpec::new("S1", "record").kwargs(&json!({ "value": 1 })))
        .unwrap();
    sub.add_activity(ActivitySpec::new("S2", "toggle")).unwrap();
    let sub = sub.build("machine").unwrap();
    let sub_id = sub.id.clone();
    root.add_sub_pipeline(sub).unwrap();
    let tree = root.build("root").unwrap();
    let executor = h.memory_executor();

    executor
        .run("subtree", tree.clone(), ExecutionContext::default())
        .await
        .unwrap();

    h.healthy.store(true, Ordering::SeqCst);
    let result = executor.retry_node("subtree", &sub_id).await.unwrap();

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(h.dispatched(), vec!["S1", "S2", "S1", "S2"]);
}
