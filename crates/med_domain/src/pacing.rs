use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SPACING: Duration = Duration::from_secs(5);
pub const DEFAULT_SUBMISSION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// How fast triggers are handed to the notification service.
///
/// Some platforms throttle scheduling calls, so consecutive submissions are
/// kept at least `spacing` apart. Each call is bounded by
/// `submission_timeout` and tried at most `max_attempts` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingPolicy {
    pub spacing: Duration,
    pub submission_timeout: Duration,
    pub max_attempts: u32,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            spacing: DEFAULT_SPACING,
            submission_timeout: DEFAULT_SUBMISSION_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl PacingPolicy {
    /// No spacing between submissions, for services without rate limits.
    pub fn unthrottled() -> Self {
        Self {
            spacing: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_spacing(mut self, spacing: Duration) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_submission_timeout(mut self, timeout: Duration) -> Self {
        self.submission_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}
