pub mod clock;
pub mod notifications;
pub mod pacing;
pub mod service;
pub mod store;
pub mod synchronizer;

pub use crate::service::{MedicationService, MedicationServiceBuilder, Mutation, ServiceError};
