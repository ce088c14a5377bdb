// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stratum Core - durable execution of pipeline trees.
//!
//! This crate runs trees built with `stratum-pipeline`:
//!
//! - [`PipelineExecutor`]: traversal, pause/resume, manual and automatic retry,
//!   termination and bounded fan-out
//! - [`Todo`] and [`TodoPolicy`]: manual confirmation items and who may act on them
//! - [`persistence`]: durable run snapshots (SQLite or in-memory)
//! - [`Config`]: environment-driven configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stratum_core::{PipelineExecutor, persistence::SqlitePersistence};
//!
//! let persistence = Arc::new(SqlitePersistence::from_path(".data/stratum.db").await?);
//! let executor = PipelineExecutor::builder()
//!     .persistence(persistence)
//!     .registry(registry.clone())
//!     .build()?;
//!
//! let result = executor.run("run-1", tree, context).await?;
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod notify;
pub mod persistence;
pub mod run;
pub mod todo;

pub use config::{Config, ConfigError};
pub use error::{CoreError, Result};
pub use executor::{ExecutorBuilder, PipelineExecutor, TodoOutcome};
pub use notify::{LogNotifier, Notifier, NotifyError};
pub use run::{NodeRecord, NodeStatus, ResumePointer, RunResult, RunState, RunStatus, RunSummary};
pub use todo::{Todo, TodoAction, TodoPolicy, TodoStatus};
