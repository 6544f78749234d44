pub mod medication;
pub mod resolver;
pub mod trigger;
pub mod validation;

pub use crate::medication::{Medication, MedicationId};
pub use crate::resolver::{resolve_all, resolve_medication, Diagnostic, Resolution};
pub use crate::trigger::{Payload, TriggerPurpose, TriggerSchedule, TriggerSpec};
pub use crate::validation::{validate, ValidationError};
