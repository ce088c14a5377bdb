// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pipeline tree model for stratum.
//!
//! This crate owns everything needed to describe a run before it executes:
//!
//! - [`PipelineNode`], [`SubProcess`] and [`Activity`]: the serializable tree
//! - [`PipelineBuilder`]: fluent, validated construction of trees
//! - [`ExecutorRegistry`] and [`ActivityExecutor`]: the executor contract
//! - [`ExecutionContext`] and [`SharedContext`]: run-scoped shared state
//! - [`RetryPolicy`]: manual or automatic retry per activity
//!
//! Execution itself lives in `stratum-core`.

mod builder;
mod context;
mod error;
mod node;
mod registry;
mod retry;

pub use builder::{ActivitySpec, PipelineBuilder};
pub use context::{ExecutionContext, SharedContext};
pub use error::BuildError;
pub use node::{
    Activity, ActivityKind, FanOut, NodeId, PipelineNode, PipelineNodeRef, SubProcess,
};
pub use registry::{
    ActivityError, ActivityExecutor, ActivityInput, ActivityOutcome, ExecutorKey,
    ExecutorRegistry,
};
pub use retry::RetryPolicy;
