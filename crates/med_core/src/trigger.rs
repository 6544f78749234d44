use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::medication::MedicationId;

pub const DOSE_TITLE: &str = "Reminder";
pub const SCRIPT_TITLE: &str = "Script Renewal Reminder";

/// Alert text shown when a trigger fires.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Payload {
    pub title: String,
    pub body: String,
}

impl Payload {
    pub fn dose(name: &str) -> Self {
        Self {
            title: DOSE_TITLE.to_string(),
            body: format!("Remember to take: {name}"),
        }
    }

    pub fn script_renewal(name: &str) -> Self {
        Self {
            title: SCRIPT_TITLE.to_string(),
            body: format!("Script renewal for {name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TriggerSchedule {
    Oneshot { fire_at: DateTime<Utc> },
    RecurringDaily { hour: u32, minute: u32 },
    /// `weekday` runs from Sunday = 1 to Saturday = 7.
    RecurringWeekly { hour: u32, minute: u32, weekday: u8 },
}

impl fmt::Display for TriggerSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSchedule::Oneshot { fire_at } => {
                write!(f, "once at {}", fire_at.format("%Y-%m-%d %H:%M UTC"))
            }
            TriggerSchedule::RecurringDaily { hour, minute } => {
                write!(f, "daily at {hour:02}:{minute:02}")
            }
            TriggerSchedule::RecurringWeekly {
                hour,
                minute,
                weekday,
            } => write!(f, "weekly on day {weekday} at {hour:02}:{minute:02}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerPurpose {
    Dose,
    ScriptRenewal,
}

/// A concrete trigger derived from a medication. Recomputed on every rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub medication: MedicationId,
    pub purpose: TriggerPurpose,
    pub schedule: TriggerSchedule,
    pub payload: Payload,
}
