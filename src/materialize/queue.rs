//! Background materialization queue
//!
//! Submissions return a generation number immediately; a dispatcher task
//! hands jobs to workers bounded by `materialize_workers`.
//!
//! # Invariants
//!
//! - Generations of a report strictly increase with each submission
//! - A run publishes only if no newer generation was submitted for its
//!   report (last-submitted-wins); otherwise it is `Superseded`
//! - Compute, generation check and publish of one report are serialized
//! - Failures never reach the submitter: they are logged, counted,
//!   broadcast and recorded in the status

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use super::materializer::{Computed, Materializer};
use crate::error::{ReportError, ReportResult};
use crate::observability::{Event, ObservationScope};
use crate::report::{MaterializationState, MaterializationStatus, ReportId};
use crate::tenant::Tenant;

const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// Broadcast when a materialization run fails
#[derive(Debug, Clone)]
pub struct MaterializationFailure {
    pub report_id: ReportId,
    pub generation: u64,
    pub error: ReportError,
}

enum RunOutcome {
    Published(u64),
    Skipped,
    Discarded,
}

struct Job {
    report_id: ReportId,
    generation: u64,
    /// Slot at submission; a retired report's jobs keep its stale generation
    slot: Arc<Slot>,
    reply: Option<oneshot::Sender<MaterializationStatus>>,
}

/// Per-report bookkeeping
#[derive(Default)]
struct Slot {
    latest: AtomicU64,
    guard: Mutex<()>,
    status: RwLock<MaterializationStatus>,
}

impl Slot {
    fn is_stale(&self, generation: u64) -> bool {
        self.latest.load(Ordering::SeqCst) > generation
    }

    fn status(&self) -> MaterializationStatus {
        self.status.read().map(|s| s.clone()).unwrap_or_default()
    }

    fn set_status(&self, status: MaterializationStatus) {
        if let Ok(mut current) = self.status.write() {
            *current = status;
        }
    }
}

struct Shared {
    tenant: Arc<Tenant>,
    materializer: Materializer,
    slots: RwLock<HashMap<ReportId, Arc<Slot>>>,
    failures: broadcast::Sender<MaterializationFailure>,
}

impl Shared {
    fn slot(&self, report_id: &ReportId) -> Arc<Slot> {
        if let Ok(slots) = self.slots.read() {
            if let Some(slot) = slots.get(report_id) {
                return slot.clone();
            }
        }
        match self.slots.write() {
            Ok(mut slots) => slots.entry(report_id.clone()).or_default().clone(),
            // poisoned registry: run untracked
            Err(_) => Arc::new(Slot::default()),
        }
    }

    async fn execute(&self, job: Job) {
        let Job {
            report_id,
            generation,
            slot,
            reply,
        } = job;
        let _serialized = slot.guard.lock().await;

        let status = if slot.is_stale(generation) {
            self.superseded(&report_id, generation, &slot)
        } else {
            slot.set_status(slot.status().with_state(MaterializationState::Running));
            let status = self.materialize(&report_id, generation, &slot).await;
            if status.state != MaterializationState::Superseded {
                slot.set_status(status.clone());
                if let Err(err) = self.tenant.reports.record_status(&report_id, &status).await {
                    warn!(report_id = %report_id, error = %err, "status not recorded");
                }
            }
            status
        };

        if let Some(reply) = reply {
            let _ = reply.send(status);
        }
    }

    async fn materialize(&self, report_id: &ReportId, generation: u64, slot: &Slot) -> MaterializationStatus {
        let previous = slot.status();
        let scope = ObservationScope::new("MATERIALIZE", report_id.as_str());
        info!(event = %Event::MaterializeStart, report_id = %report_id, generation);

        let timeout = self.tenant.config.materialize_timeout();
        let work = async {
            match self.materializer.compute(report_id, self.tenant.now()).await? {
                // a newer submission exists: the computed rows are discarded
                Computed::Rows(_) if slot.is_stale(generation) => Ok(RunOutcome::Discarded),
                Computed::Rows(rows) => self
                    .materializer
                    .publish(report_id, rows)
                    .await
                    .map(RunOutcome::Published),
                Computed::Nothing => Ok(RunOutcome::Skipped),
            }
        };
        let result = match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(ReportError::Timeout {
                operation: "materialize",
                elapsed: timeout,
            }),
        };

        match result {
            Ok(RunOutcome::Published(rows)) => {
                self.tenant.metrics.record_published(rows);
                scope.complete(rows);
                MaterializationStatus::published(generation, rows, Utc::now())
            }
            Ok(RunOutcome::Skipped) => {
                self.tenant.metrics.increment_skipped();
                info!(event = %Event::MaterializeSkipped, report_id = %report_id, generation);
                scope.complete(0);
                previous
                    .with_state(MaterializationState::Skipped)
                    .at_generation(generation)
            }
            Ok(RunOutcome::Discarded) => {
                scope.complete(0);
                self.superseded(report_id, generation, slot)
            }
            Err(err) => {
                self.tenant.metrics.increment_materialize_failures();
                error!(
                    event = %Event::MaterializeFailed,
                    tenant = %self.tenant.name,
                    report_id = %report_id,
                    generation,
                    code = err.code(),
                    error = %err,
                );
                scope.fail(&err);
                let _ = self.failures.send(MaterializationFailure {
                    report_id: report_id.clone(),
                    generation,
                    error: err.clone(),
                });
                MaterializationStatus::failed(generation, err.to_string(), &previous)
            }
        }
    }

    fn superseded(&self, report_id: &ReportId, generation: u64, slot: &Slot) -> MaterializationStatus {
        self.tenant.metrics.increment_superseded();
        info!(
            event = %Event::MaterializeSuperseded,
            report_id = %report_id,
            generation,
            latest = slot.latest.load(Ordering::SeqCst),
        );
        slot.status()
            .with_state(MaterializationState::Superseded)
            .at_generation(generation)
    }
}

/// Schedules materialization runs in the background
///
/// Must be started inside a tokio runtime.
#[derive(Clone)]
pub struct MaterializationQueue {
    shared: Arc<Shared>,
    sender: mpsc::UnboundedSender<Job>,
}

impl MaterializationQueue {
    pub fn start(tenant: Arc<Tenant>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        let workers = Arc::new(Semaphore::new(tenant.config.materialize_workers.max(1)));
        let shared = Arc::new(Shared {
            materializer: Materializer::new(tenant.clone()),
            tenant,
            slots: RwLock::new(HashMap::new()),
            failures,
        });

        let dispatcher = shared.clone();
        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let Ok(permit) = workers.clone().acquire_owned().await else {
                    break;
                };
                let shared = dispatcher.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    shared.execute(job).await;
                });
            }
        });

        Self { shared, sender }
    }

    /// Schedules a run and returns its generation.
    pub fn submit(&self, report_id: &ReportId) -> ReportResult<u64> {
        self.enqueue(report_id, None)
    }

    /// Schedules a run and waits for its final status.
    pub async fn submit_and_wait(&self, report_id: &ReportId) -> ReportResult<MaterializationStatus> {
        let (reply, done) = oneshot::channel();
        self.enqueue(report_id, Some(reply))?;
        done.await.map_err(|_| ReportError::QueueClosed)
    }

    fn enqueue(
        &self,
        report_id: &ReportId,
        reply: Option<oneshot::Sender<MaterializationStatus>>,
    ) -> ReportResult<u64> {
        let slot = self.shared.slot(report_id);
        let generation = slot.latest.fetch_add(1, Ordering::SeqCst) + 1;
        slot.set_status(MaterializationStatus::scheduled(generation, &slot.status()));

        self.sender
            .send(Job {
                report_id: report_id.clone(),
                generation,
                slot,
                reply,
            })
            .map_err(|_| ReportError::QueueClosed)?;

        info!(
            event = %Event::MaterializeScheduled,
            tenant = %self.shared.tenant.name,
            report_id = %report_id,
            generation,
        );
        Ok(generation)
    }

    /// Latest known status of a report, `None` if never submitted here.
    pub fn status(&self, report_id: &ReportId) -> Option<MaterializationStatus> {
        let slots = self.shared.slots.read().ok()?;
        slots.get(report_id).map(|slot| slot.status())
    }

    /// Failure notifications from now on
    pub fn subscribe_failures(&self) -> broadcast::Receiver<MaterializationFailure> {
        self.shared.failures.subscribe()
    }

    /// Runs `removal` once no run of the report is in flight, then drops its
    /// bookkeeping.
    ///
    /// Queued and running generations are superseded first, so a run that
    /// already computed its rows discards them instead of publishing.
    pub async fn retire<T>(&self, report_id: &ReportId, removal: impl Future<Output = T>) -> T {
        let slot = self.shared.slot(report_id);
        let latest = slot.latest.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(report_id = %report_id, latest, "retiring report");
        let result = {
            let _serialized = slot.guard.lock().await;
            removal.await
        };
        self.forget(report_id);
        result
    }

    /// Drops bookkeeping of a removed report.
    pub fn forget(&self, report_id: &ReportId) {
        if let Ok(mut slots) = self.shared.slots.write() {
            slots.remove(report_id);
        }
    }
}
