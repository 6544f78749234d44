use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use med_core::{validate, Medication, MedicationId, ValidationError};

use crate::clock::{Clock, SystemClock};
use crate::notifications::{InMemoryNotifier, NotificationService};
use crate::pacing::PacingPolicy;
use crate::store::{MedicationRepository, MemoryStore};
use crate::synchronizer::{RebuildTicket, SyncHandle, SyncPhase, Synchronizer};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("no medication with id {0}")]
    NotFound(MedicationId),
    #[error("a medication with id {0} already exists")]
    DuplicateId(MedicationId),
    #[error("medication store failed")]
    Persistence(#[source] anyhow::Error),
}

/// Result of a successful add, update or delete.
#[derive(Debug)]
pub struct Mutation {
    pub id: MedicationId,
    pub rebuild: RebuildTicket,
}

struct State {
    medications: Vec<Medication>,
    generation: u64,
    repository: Box<dyn MedicationRepository>,
}

/// Owns the medication list, persists it and keeps reminders in step with it.
pub struct MedicationService {
    state: Mutex<State>,
    sync: SyncHandle,
    worker: Option<JoinHandle<()>>,
}

pub struct MedicationServiceBuilder {
    repository: Option<Box<dyn MedicationRepository>>,
    notifier: Option<Arc<dyn NotificationService>>,
    pacing: PacingPolicy,
    clock: Arc<dyn Clock>,
    resync_on_start: bool,
}

impl Default for MedicationServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MedicationServiceBuilder {
    pub fn new() -> Self {
        Self {
            repository: None,
            notifier: None,
            pacing: PacingPolicy::default(),
            clock: Arc::new(SystemClock),
            resync_on_start: false,
        }
    }

    pub fn with_repository(mut self, repository: Box<dyn MedicationRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_notification_service(mut self, notifier: Arc<dyn NotificationService>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_pacing(mut self, pacing: PacingPolicy) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Rebuild all reminders as soon as the service starts.
    pub fn resync_on_start(mut self, enabled: bool) -> Self {
        self.resync_on_start = enabled;
        self
    }

    /// Loads the stored list and starts the rebuild worker. Must be called
    /// inside a tokio runtime.
    pub fn build(self) -> anyhow::Result<MedicationService> {
        let repository = self
            .repository
            .unwrap_or_else(|| Box::new(MemoryStore::default()) as Box<dyn MedicationRepository>);
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(InMemoryNotifier::new()) as Arc<dyn NotificationService>);
        let medications = repository
            .load_all()
            .context("loading stored medications")?;
        info!(count = medications.len(), "medications loaded");

        let (sync, worker) = Synchronizer::new(notifier, self.pacing, self.clock).spawn();
        let service = MedicationService {
            state: Mutex::new(State {
                medications,
                generation: 0,
                repository,
            }),
            sync,
            worker: Some(worker),
        };
        if self.resync_on_start {
            service.resync();
        }
        Ok(service)
    }
}

impl MedicationService {
    pub fn builder() -> MedicationServiceBuilder {
        MedicationServiceBuilder::new()
    }

    pub fn medications(&self) -> Vec<Medication> {
        self.state.lock().medications.clone()
    }

    pub fn get(&self, id: MedicationId) -> Option<Medication> {
        self.state
            .lock()
            .medications
            .iter()
            .find(|medication| medication.id == id)
            .cloned()
    }

    #[instrument(skip(self, medication), fields(id = %medication.id))]
    pub fn add(&self, medication: Medication) -> Result<Mutation, ServiceError> {
        validate(&medication)?;
        let id = medication.id;
        let rebuild = self.mutate(|medications| {
            if medications.iter().any(|existing| existing.id == id) {
                return Err(ServiceError::DuplicateId(id));
            }
            medications.push(medication);
            Ok(())
        })?;
        info!("medication added");
        Ok(Mutation { id, rebuild })
    }

    /// Replaces the record stored under `id`. The stored id is kept even if
    /// `medication` carries a different one.
    #[instrument(skip(self, medication))]
    pub fn update(
        &self,
        id: MedicationId,
        mut medication: Medication,
    ) -> Result<Mutation, ServiceError> {
        validate(&medication)?;
        medication.id = id;
        let rebuild = self.mutate(|medications| {
            let slot = medications
                .iter_mut()
                .find(|existing| existing.id == id)
                .ok_or(ServiceError::NotFound(id))?;
            *slot = medication;
            Ok(())
        })?;
        info!("medication updated");
        Ok(Mutation { id, rebuild })
    }

    #[instrument(skip(self))]
    pub fn delete(&self, id: MedicationId) -> Result<Mutation, ServiceError> {
        let rebuild = self.mutate(|medications| {
            let index = medications
                .iter()
                .position(|existing| existing.id == id)
                .ok_or(ServiceError::NotFound(id))?;
            medications.remove(index);
            Ok(())
        })?;
        info!("medication deleted");
        Ok(Mutation { id, rebuild })
    }

    /// Rebuilds reminders for the current list without changing it.
    pub fn resync(&self) -> RebuildTicket {
        let mut state = self.state.lock();
        state.generation += 1;
        self.sync
            .request(state.generation, state.medications.clone())
    }

    /// Re-reads the repository, replaces the in-memory list and rebuilds.
    pub fn reload(&self) -> Result<RebuildTicket, ServiceError> {
        let mut state = self.state.lock();
        let medications = state
            .repository
            .load_all()
            .map_err(ServiceError::Persistence)?;
        info!(count = medications.len(), "medications reloaded");
        state.medications = medications;
        state.generation += 1;
        Ok(self
            .sync
            .request(state.generation, state.medications.clone()))
    }

    /// Waits for every rebuild requested so far. Returns false if the worker
    /// has stopped.
    pub async fn flush(&self) -> bool {
        let target = self.state.lock().generation;
        self.sync.wait_for(target).await
    }

    pub fn phase(&self) -> SyncPhase {
        self.sync.phase()
    }

    /// Finishes outstanding rebuilds and stops the worker.
    pub async fn shutdown(mut self) {
        self.flush().await;
        let worker = self.worker.take();
        drop(self);
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                warn!(%err, "rebuild worker ended abnormally");
            }
        }
    }

    /// Applies `change` to a copy of the list, persists it and only then makes
    /// it current. The rebuild is queued while the lock is held so queue order
    /// matches mutation order.
    fn mutate(
        &self,
        change: impl FnOnce(&mut Vec<Medication>) -> Result<(), ServiceError>,
    ) -> Result<RebuildTicket, ServiceError> {
        let mut state = self.state.lock();
        let mut next = state.medications.clone();
        change(&mut next)?;
        if let Err(err) = state.repository.save_all(&next) {
            warn!(error = %err, "persisting medications failed; change discarded");
            return Err(ServiceError::Persistence(err));
        }
        state.medications = next;
        state.generation += 1;
        Ok(self
            .sync
            .request(state.generation, state.medications.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    use crate::clock::FixedClock;
    use crate::notifications::InMemoryNotifier;

    struct FailingStore;

    impl MedicationRepository for FailingStore {
        fn load_all(&self) -> anyhow::Result<Vec<Medication>> {
            Ok(Vec::new())
        }

        fn save_all(&self, _medications: &[Medication]) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    fn service_with(notifier: Arc<InMemoryNotifier>) -> MedicationService {
        MedicationService::builder()
            .with_notification_service(notifier)
            .with_pacing(PacingPolicy::unthrottled())
            .with_clock(Arc::new(FixedClock(
                Local.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap(),
            )))
            .build()
            .expect("service")
    }

    #[tokio::test]
    async fn invalid_records_never_reach_the_store() {
        let notifier = Arc::new(InMemoryNotifier::new());
        let service = service_with(notifier.clone());
        let both = Medication::new("Both")
            .with_times(["08:00"])
            .everyday()
            .on_dates(["2026-12-01"]);
        let err = service.add(both).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Invalid(ValidationError::ConflictingSchedule)
        ));
        assert!(service.medications().is_empty());
        assert!(notifier.events().is_empty());
    }

    #[tokio::test]
    async fn update_keeps_the_stored_identifier() {
        let service = service_with(Arc::new(InMemoryNotifier::new()));
        let original = Medication::new("Aspirin").with_times(["08:00"]).everyday();
        let id = service.add(original).expect("add").id;

        let replacement = Medication::new("Aspirin 300mg")
            .with_times(["09:00"])
            .everyday();
        let mutation = service.update(id, replacement).expect("update");
        assert_eq!(mutation.id, id);
        mutation.rebuild.wait().await.expect("report");

        let stored = service.get(id).expect("still stored");
        assert_eq!(stored.name, "Aspirin 300mg");
        assert_eq!(service.medications().len(), 1);
    }

    #[tokio::test]
    async fn unknown_and_duplicate_ids_are_rejected() {
        let service = service_with(Arc::new(InMemoryNotifier::new()));
        let med = Medication::new("Aspirin").with_times(["08:00"]).everyday();
        service.add(med.clone()).expect("add");
        assert!(matches!(
            service.add(med),
            Err(ServiceError::DuplicateId(_))
        ));

        let stranger = MedicationId::new();
        assert!(matches!(
            service.delete(stranger),
            Err(ServiceError::NotFound(id)) if id == stranger
        ));
        let replacement = Medication::new("Other").with_times(["08:00"]).everyday();
        assert!(matches!(
            service.update(stranger, replacement),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_persistence_discards_the_change() {
        let notifier = Arc::new(InMemoryNotifier::new());
        let service = MedicationService::builder()
            .with_repository(Box::new(FailingStore))
            .with_notification_service(notifier.clone())
            .with_pacing(PacingPolicy::unthrottled())
            .build()
            .expect("service");
        let med = Medication::new("Aspirin").with_times(["08:00"]).everyday();
        assert!(matches!(
            service.add(med),
            Err(ServiceError::Persistence(_))
        ));
        assert!(service.medications().is_empty());
        assert!(service.flush().await);
        assert!(notifier.events().is_empty());
    }
}
