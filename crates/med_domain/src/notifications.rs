use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use med_core::{Payload, TriggerSchedule, TriggerSpec};

/// Opaque identifier returned by the platform for a scheduled trigger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerHandle(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("notification permission was not granted")]
    PermissionDenied,
    #[error("notification service rejected the trigger: {0}")]
    Rejected(String),
    #[error("notification service unavailable: {0}")]
    Unavailable(String),
}

/// Platform-specific notification adapters implement this trait.
///
/// Every call may suspend while the platform completes the request. The only
/// cancellation primitive is [`NotificationService::cancel_all`].
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn request_permission(&self) -> Result<PermissionStatus, NotificationError> {
        Ok(PermissionStatus::Granted)
    }

    async fn cancel_all(&self) -> Result<(), NotificationError>;

    async fn schedule_oneshot(
        &self,
        payload: &Payload,
        fire_at: DateTime<Utc>,
    ) -> Result<TriggerHandle, NotificationError>;

    async fn schedule_daily(
        &self,
        payload: &Payload,
        hour: u32,
        minute: u32,
    ) -> Result<TriggerHandle, NotificationError>;

    /// `weekday` runs from Sunday = 1 to Saturday = 7.
    async fn schedule_weekly(
        &self,
        payload: &Payload,
        hour: u32,
        minute: u32,
        weekday: u8,
    ) -> Result<TriggerHandle, NotificationError>;
}

/// Routes a trigger specification to the matching scheduling call.
pub async fn submit(
    service: &dyn NotificationService,
    spec: &TriggerSpec,
) -> Result<TriggerHandle, NotificationError> {
    match spec.schedule {
        TriggerSchedule::Oneshot { fire_at } => {
            service.schedule_oneshot(&spec.payload, fire_at).await
        }
        TriggerSchedule::RecurringDaily { hour, minute } => {
            service.schedule_daily(&spec.payload, hour, minute).await
        }
        TriggerSchedule::RecurringWeekly {
            hour,
            minute,
            weekday,
        } => {
            service
                .schedule_weekly(&spec.payload, hour, minute, weekday)
                .await
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTrigger {
    pub handle: TriggerHandle,
    pub schedule: TriggerSchedule,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierEvent {
    CancelAll,
    Scheduled(TriggerSchedule),
}

#[derive(Debug)]
struct InMemoryState {
    next_handle: u64,
    permission: PermissionStatus,
    pending: Vec<PendingTrigger>,
    events: Vec<NotifierEvent>,
    rejected_bodies: Vec<String>,
}

/// Keeps pending triggers in process memory. Used for dry runs and tests.
#[derive(Debug)]
pub struct InMemoryNotifier {
    state: Mutex<InMemoryState>,
}

impl Default for InMemoryNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InMemoryState {
                next_handle: 1,
                permission: PermissionStatus::Granted,
                pending: Vec::new(),
                events: Vec::new(),
                rejected_bodies: Vec::new(),
            }),
        }
    }

    pub fn set_permission(&self, permission: PermissionStatus) {
        self.state.lock().permission = permission;
    }

    /// Rejects every submission whose payload body contains `needle`.
    pub fn reject_bodies_containing(&self, needle: impl Into<String>) {
        self.state.lock().rejected_bodies.push(needle.into());
    }

    pub fn pending(&self) -> Vec<PendingTrigger> {
        self.state.lock().pending.clone()
    }

    pub fn pending_schedules(&self) -> Vec<(TriggerSchedule, Payload)> {
        self.state
            .lock()
            .pending
            .iter()
            .map(|trigger| (trigger.schedule, trigger.payload.clone()))
            .collect()
    }

    pub fn events(&self) -> Vec<NotifierEvent> {
        self.state.lock().events.clone()
    }

    fn record(
        &self,
        payload: &Payload,
        schedule: TriggerSchedule,
    ) -> Result<TriggerHandle, NotificationError> {
        let mut state = self.state.lock();
        if state.permission == PermissionStatus::Denied {
            return Err(NotificationError::PermissionDenied);
        }
        if state
            .rejected_bodies
            .iter()
            .any(|needle| payload.body.contains(needle.as_str()))
        {
            return Err(NotificationError::Rejected(payload.body.clone()));
        }
        let handle = TriggerHandle(format!("mem-{}", state.next_handle));
        state.next_handle += 1;
        state.events.push(NotifierEvent::Scheduled(schedule));
        state.pending.push(PendingTrigger {
            handle: handle.clone(),
            schedule,
            payload: payload.clone(),
        });
        tracing::debug!(handle = %handle.0, %schedule, "trigger recorded");
        Ok(handle)
    }
}

#[async_trait]
impl NotificationService for InMemoryNotifier {
    async fn request_permission(&self) -> Result<PermissionStatus, NotificationError> {
        Ok(self.state.lock().permission)
    }

    async fn cancel_all(&self) -> Result<(), NotificationError> {
        let mut state = self.state.lock();
        state.pending.clear();
        state.events.push(NotifierEvent::CancelAll);
        Ok(())
    }

    async fn schedule_oneshot(
        &self,
        payload: &Payload,
        fire_at: DateTime<Utc>,
    ) -> Result<TriggerHandle, NotificationError> {
        self.record(payload, TriggerSchedule::Oneshot { fire_at })
    }

    async fn schedule_daily(
        &self,
        payload: &Payload,
        hour: u32,
        minute: u32,
    ) -> Result<TriggerHandle, NotificationError> {
        self.record(payload, TriggerSchedule::RecurringDaily { hour, minute })
    }

    async fn schedule_weekly(
        &self,
        payload: &Payload,
        hour: u32,
        minute: u32,
        weekday: u8,
    ) -> Result<TriggerHandle, NotificationError> {
        self.record(
            payload,
            TriggerSchedule::RecurringWeekly {
                hour,
                minute,
                weekday,
            },
        )
    }
}
