//! Keeps the notification service's pending triggers equal to the resolved
//! medication list.
//!
//! Every rebuild cancels all pending triggers, resolves the snapshot it was
//! given and resubmits the result one trigger at a time. Rebuilds run on a
//! single worker task fed by a FIFO queue, so two rebuilds never interleave.
//! When several requests are waiting only the newest snapshot is rebuilt, and
//! a rebuild that is still submitting stops early once a newer request shows
//! up, since the next cancel-all would discard its work anyway.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, instrument, warn};

use med_core::{resolve_all, Diagnostic, Medication, TriggerSpec};

use crate::clock::Clock;
use crate::notifications::{
    self, NotificationError, NotificationService, PermissionStatus, TriggerHandle,
};
use crate::pacing::PacingPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    Idle,
    Cancelling,
    Submitting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionFailure {
    pub trigger: TriggerSpec,
    pub error: String,
    pub attempts: u32,
}

/// Outcome of one rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub generation: u64,
    pub planned: usize,
    pub submitted: usize,
    pub failures: Vec<SubmissionFailure>,
    pub diagnostics: Vec<Diagnostic>,
    pub cancel_error: Option<String>,
    pub permission: Option<PermissionStatus>,
    pub superseded: bool,
}

impl RebuildReport {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }

    /// True when every planned trigger reached the notification service.
    pub fn is_complete(&self) -> bool {
        !self.superseded
            && self.cancel_error.is_none()
            && self.failures.is_empty()
            && self.submitted == self.planned
    }

    /// Diagnostics other than reminders whose time has already passed.
    pub fn input_problems(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|diag| !diag.is_elapsed())
    }
}

/// Runs the cancel / resolve / submit protocol against one notification service.
pub struct Synchronizer {
    notifier: Arc<dyn NotificationService>,
    pacing: PacingPolicy,
    clock: Arc<dyn Clock>,
}

impl Synchronizer {
    pub fn new(
        notifier: Arc<dyn NotificationService>,
        pacing: PacingPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            notifier,
            pacing,
            clock,
        }
    }

    /// Starts the rebuild worker. Must be called inside a tokio runtime.
    pub fn spawn(self) -> (SyncHandle, JoinHandle<()>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(SyncPhase::Idle);
        let (completed_tx, completed_rx) = watch::channel(0u64);
        let worker = Worker {
            synchronizer: self,
            inbox: Inbox {
                requests: request_rx,
                latest: None,
                waiting: Vec::new(),
            },
            phase: phase_tx,
            completed: completed_tx,
        };
        let join = tokio::spawn(worker.run());
        let handle = SyncHandle {
            requests: request_tx,
            phase: phase_rx,
            completed: completed_rx,
        };
        (handle, join)
    }

    /// One full rebuild of `medications`. `interrupted` is polled before every
    /// submission; returning true abandons the remaining submissions.
    #[instrument(skip(self, medications, phase, interrupted), fields(medications = medications.len()))]
    pub async fn rebuild(
        &self,
        generation: u64,
        medications: &[Medication],
        phase: &watch::Sender<SyncPhase>,
        mut interrupted: impl FnMut() -> bool,
    ) -> RebuildReport {
        let mut report = RebuildReport::new(generation);

        phase.send_replace(SyncPhase::Cancelling);
        match timeout(self.pacing.submission_timeout, self.notifier.cancel_all()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(%err, "cancelling pending triggers failed");
                report.cancel_error = Some(err.to_string());
            }
            Err(_) => {
                warn!(
                    timeout = ?self.pacing.submission_timeout,
                    "cancelling pending triggers timed out"
                );
                report.cancel_error = Some(format!(
                    "cancel timed out after {:?}",
                    self.pacing.submission_timeout
                ));
            }
        }

        match self.notifier.request_permission().await {
            Ok(status) => {
                if status == PermissionStatus::Denied {
                    warn!("notification permission denied; reminders will not be delivered");
                }
                report.permission = Some(status);
            }
            Err(err) => warn!(%err, "unable to query notification permission"),
        }

        let now = self.clock.now();
        let resolution = resolve_all(medications, &now);
        report.planned = resolution.triggers.len();
        report.diagnostics = resolution.diagnostics;

        phase.send_replace(SyncPhase::Submitting);
        let mut last_call: Option<Instant> = None;
        for trigger in &resolution.triggers {
            self.pace(last_call).await;
            if interrupted() {
                debug!(generation, "newer rebuild queued; abandoning submissions");
                report.superseded = true;
                break;
            }
            match self.submit(trigger, &mut last_call).await {
                Ok(handle) => {
                    debug!(handle = %handle.0, schedule = %trigger.schedule, "trigger scheduled");
                    report.submitted += 1;
                }
                Err(failure) => report.failures.push(failure),
            }
        }

        phase.send_replace(SyncPhase::Idle);
        report
    }

    async fn pace(&self, last_call: Option<Instant>) {
        if let Some(last) = last_call {
            sleep_until(last + self.pacing.spacing).await;
        }
    }

    async fn submit(
        &self,
        trigger: &TriggerSpec,
        last_call: &mut Option<Instant>,
    ) -> Result<TriggerHandle, SubmissionFailure> {
        let mut attempts = 0;
        let mut last_error = String::new();
        while attempts < self.pacing.attempts() {
            if attempts > 0 {
                self.pace(*last_call).await;
            }
            attempts += 1;
            let outcome = timeout(
                self.pacing.submission_timeout,
                notifications::submit(self.notifier.as_ref(), trigger),
            )
            .await;
            *last_call = Some(Instant::now());
            match outcome {
                Ok(Ok(handle)) => return Ok(handle),
                Ok(Err(NotificationError::PermissionDenied)) => {
                    last_error = NotificationError::PermissionDenied.to_string();
                    break;
                }
                Ok(Err(err)) => {
                    warn!(
                        attempt = attempts,
                        %err,
                        schedule = %trigger.schedule,
                        "trigger submission failed"
                    );
                    last_error = err.to_string();
                }
                Err(_) => {
                    warn!(
                        attempt = attempts,
                        timeout = ?self.pacing.submission_timeout,
                        schedule = %trigger.schedule,
                        "trigger submission timed out"
                    );
                    last_error = format!("timed out after {:?}", self.pacing.submission_timeout);
                }
            }
        }
        Err(SubmissionFailure {
            trigger: trigger.clone(),
            error: last_error,
            attempts,
        })
    }
}

struct RebuildRequest {
    generation: u64,
    medications: Vec<Medication>,
    waiter: Option<oneshot::Sender<RebuildReport>>,
}

/// Handle used to queue rebuilds and observe the worker.
#[derive(Clone)]
pub struct SyncHandle {
    requests: mpsc::UnboundedSender<RebuildRequest>,
    phase: watch::Receiver<SyncPhase>,
    completed: watch::Receiver<u64>,
}

impl SyncHandle {
    /// Queues a rebuild of `medications`. Generations must increase with
    /// every call.
    pub fn request(&self, generation: u64, medications: Vec<Medication>) -> RebuildTicket {
        let (waiter, report) = oneshot::channel();
        let request = RebuildRequest {
            generation,
            medications,
            waiter: Some(waiter),
        };
        if self.requests.send(request).is_err() {
            warn!(generation, "rebuild worker has stopped; request dropped");
        }
        RebuildTicket { generation, report }
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    pub fn completed_generation(&self) -> u64 {
        *self.completed.borrow()
    }

    /// Waits until a rebuild covering `generation` has finished. Returns false
    /// if the worker stopped first.
    pub async fn wait_for(&self, generation: u64) -> bool {
        let mut completed = self.completed.clone();
        let reached = completed.wait_for(|done| *done >= generation).await.is_ok();
        reached
    }
}

/// Resolves to the report of the rebuild that covered a request. Superseded
/// requests receive the report of the newer rebuild that replaced them.
#[derive(Debug)]
pub struct RebuildTicket {
    generation: u64,
    report: oneshot::Receiver<RebuildReport>,
}

impl RebuildTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn wait(self) -> Option<RebuildReport> {
        self.report.await.ok()
    }
}

struct Target {
    generation: u64,
    medications: Vec<Medication>,
}

struct Inbox {
    requests: mpsc::UnboundedReceiver<RebuildRequest>,
    latest: Option<Target>,
    waiting: Vec<oneshot::Sender<RebuildReport>>,
}

impl Inbox {
    fn absorb(&mut self, request: RebuildRequest) {
        if let Some(previous) = &self.latest {
            debug!(
                superseded = previous.generation,
                by = request.generation,
                "coalescing rebuild requests"
            );
        }
        if let Some(waiter) = request.waiter {
            self.waiting.push(waiter);
        }
        self.latest = Some(Target {
            generation: request.generation,
            medications: request.medications,
        });
    }

    /// Pulls in everything already queued. Returns true if anything arrived.
    fn absorb_queued(&mut self) -> bool {
        let mut received = false;
        while let Ok(request) = self.requests.try_recv() {
            self.absorb(request);
            received = true;
        }
        received
    }
}

struct Worker {
    synchronizer: Synchronizer,
    inbox: Inbox,
    phase: watch::Sender<SyncPhase>,
    completed: watch::Sender<u64>,
}

impl Worker {
    async fn run(mut self) {
        debug!("rebuild worker started");
        loop {
            if self.inbox.latest.is_none() {
                match self.inbox.requests.recv().await {
                    Some(request) => self.inbox.absorb(request),
                    None => break,
                }
            }
            self.inbox.absorb_queued();
            let Some(target) = self.inbox.latest.take() else {
                continue;
            };

            let inbox = &mut self.inbox;
            let report = self
                .synchronizer
                .rebuild(target.generation, &target.medications, &self.phase, || {
                    inbox.absorb_queued()
                })
                .await;

            if report.superseded {
                continue;
            }
            log_report(&report);
            self.completed.send_replace(report.generation);
            for waiter in self.inbox.waiting.drain(..) {
                let _ = waiter.send(report.clone());
            }
        }
        self.phase.send_replace(SyncPhase::Idle);
        debug!("rebuild worker stopped");
    }
}

fn log_report(report: &RebuildReport) {
    let problems = report.input_problems().count();
    if report.is_complete() && problems == 0 {
        info!(
            generation = report.generation,
            submitted = report.submitted,
            "reminders rebuilt"
        );
    } else {
        warn!(
            generation = report.generation,
            planned = report.planned,
            submitted = report.submitted,
            failed = report.failures.len(),
            skipped_fragments = problems,
            cancel_failed = report.cancel_error.is_some(),
            permission = ?report.permission,
            "reminders rebuilt with problems"
        );
    }
}
