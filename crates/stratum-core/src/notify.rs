// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Todo notifications.

use async_trait::async_trait;

use crate::todo::Todo;

#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Delivers todo notifications to people.
///
/// Failures are logged by the executor and never fail a run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_todo(&self, todo: &Todo, recipients: &[String]) -> Result<(), NotifyError>;
}

/// Notifier that only writes a log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_todo(&self, todo: &Todo, recipients: &[String]) -> Result<(), NotifyError> {
        tracing::info!(
            todo_id = %todo.id,
            run_id = %todo.run_id,
            recipients = ?recipients,
            "Todo waiting for confirmation"
        );
        Ok(())
    }
}
