use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use med_core::Payload;
use med_domain::notifications::{
    InMemoryNotifier, NotificationError, NotificationService, TriggerHandle,
};

/// Notification adapter for terminals: logs every request and keeps the
/// pending set in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct ConsoleNotifier {
    inner: InMemoryNotifier,
}

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationService for ConsoleNotifier {
    async fn cancel_all(&self) -> Result<(), NotificationError> {
        info!("cancelling all pending reminders");
        self.inner.cancel_all().await
    }

    async fn schedule_oneshot(
        &self,
        payload: &Payload,
        fire_at: DateTime<Utc>,
    ) -> Result<TriggerHandle, NotificationError> {
        info!(title = %payload.title, body = %payload.body, %fire_at, "one-shot reminder");
        self.inner.schedule_oneshot(payload, fire_at).await
    }

    async fn schedule_daily(
        &self,
        payload: &Payload,
        hour: u32,
        minute: u32,
    ) -> Result<TriggerHandle, NotificationError> {
        info!(title = %payload.title, body = %payload.body, "daily reminder at {hour:02}:{minute:02}");
        self.inner.schedule_daily(payload, hour, minute).await
    }

    async fn schedule_weekly(
        &self,
        payload: &Payload,
        hour: u32,
        minute: u32,
        weekday: u8,
    ) -> Result<TriggerHandle, NotificationError> {
        info!(
            title = %payload.title,
            body = %payload.body,
            weekday,
            "weekly reminder at {hour:02}:{minute:02}"
        );
        self.inner.schedule_weekly(payload, hour, minute, weekday).await
    }
}
