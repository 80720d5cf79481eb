//! One-shot trigger facility used to re-arm the trend harvest.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;

/// A scheduled future invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTrigger {
    pub id: Uuid,
    pub handler: String,
    pub due_at: DateTime<Utc>,
}

impl PendingTrigger {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }
}

/// Schedules, lists and cancels one-shot invocations by handler name.
#[async_trait]
pub trait TriggerScheduler: Send + Sync {
    async fn schedule_once(&self, handler: &str, after: Duration) -> Result<PendingTrigger>;

    async fn pending(&self, handler: &str) -> Result<Vec<PendingTrigger>>;

    async fn cancel(&self, id: Uuid) -> Result<()>;

    /// Cancel every pending trigger for a handler. Returns how many were removed.
    async fn cancel_all(&self, handler: &str) -> Result<usize> {
        let pending = self.pending(handler).await?;
        for trigger in &pending {
            self.cancel(trigger.id).await?;
        }
        Ok(pending.len())
    }
}
