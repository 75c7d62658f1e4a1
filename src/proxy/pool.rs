//! Validation pool: a fixed set of workers draining one shared queue
//!
//! A run seeds a FIFO queue with every loaded record and starts
//! `min(concurrency, records)` workers. Each worker claims the head of the
//! queue, probes it, and publishes the terminal state. Claiming, committing
//! and stopping all happen under a single run lock, taken before any record
//! lock, so a record is owned by at most one worker and the counters never
//! drift from the record states.

use crate::error::ProbeError;
use crate::proxy::models::{ProbeOutcome, ProbeTarget, ProxyStatus};
use crate::proxy::probe::ProxyProbe;
use crate::proxy::records::RecordSet;
use crate::proxy::stats::{ResultAggregator, Snapshot, Tally};
use chrono::Utc;
use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default number of concurrent workers
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default per-probe timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Configuration for a validation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on concurrently running probes
    pub concurrency: usize,
    /// Timeout handed to every probe
    pub timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker limit; zero is raised to one
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_timeout_secs(self, secs: u64) -> Self {
        self.with_timeout(Duration::from_secs(secs))
    }
}

struct RunInner {
    running: bool,
    queue: VecDeque<usize>,
    tally: Tally,
}

/// Shared state of one run
pub(crate) struct RunState {
    inner: Mutex<RunInner>,
    total: usize,
}

/// A record checked out of the queue by a worker
struct Claim {
    id: usize,
    target: ProbeTarget,
}

impl RunState {
    fn new(total: usize) -> Self {
        Self {
            inner: Mutex::new(RunInner {
                running: total > 0,
                queue: (0..total).collect(),
                tally: Tally::default(),
            }),
            total,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot::new(self.total, inner.tally, inner.running)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Dequeue the next record and mark it in flight
    fn claim(&self, records: &RecordSet) -> Option<Claim> {
        let mut inner = self.lock();
        if !inner.running {
            return None;
        }

        while let Some(id) = inner.queue.pop_front() {
            let Some(mut record) = records.lock(id) else {
                continue;
            };
            record.status = ProxyStatus::Checking;
            inner.tally.begin_check();
            return Some(Claim {
                id,
                target: record.target(),
            });
        }

        None
    }

    /// Publish a probe result; returns false if the run was stopped meanwhile
    fn commit(
        &self,
        records: &RecordSet,
        id: usize,
        result: Result<ProbeOutcome, ProbeError>,
        timeout: Duration,
    ) -> bool {
        let mut inner = self.lock();
        if !inner.running {
            return false;
        }

        let Some(mut record) = records.lock(id) else {
            return false;
        };
        record.last_checked_at = Some(Utc::now());

        let working = match result {
            Ok(outcome) if outcome.working => {
                record.status = ProxyStatus::Working;
                record.latency_ms = Some(outcome.response_time_ms);
                record.geo = outcome.into_geo();
                true
            }
            Ok(outcome) => {
                record.status = ProxyStatus::Failed;
                record.latency_ms = Some(outcome.response_time_ms);
                false
            }
            Err(e) => {
                warn!(proxy = %record.address, error = %e, "probe raised");
                record.status = ProxyStatus::Failed;
                record.latency_ms = Some(timeout.as_millis() as u64);
                false
            }
        };
        debug!(id, proxy = %record.address, status = %record.status, "record checked");
        drop(record);

        inner.tally.finish_check(working);
        if inner.tally.checked >= self.total {
            Self::settle(&mut inner, records);
            info!(
                total = self.total,
                working = inner.tally.working,
                failed = inner.tally.failed,
                "run complete"
            );
        }

        true
    }

    /// Stop the run; returns false if it had already ended
    fn stop(&self, records: &RecordSet) -> bool {
        let mut inner = self.lock();
        let was_running = inner.running;
        Self::settle(&mut inner, records);
        if was_running {
            info!(
                checked = inner.tally.checked,
                total = self.total,
                "run stopped"
            );
        }
        was_running
    }

    /// End the run: fail anything still in flight and rebuild the counters
    fn settle(inner: &mut RunInner, records: &RecordSet) {
        inner.running = false;
        inner.queue.clear();

        let now = Utc::now();
        let mut statuses = Vec::with_capacity(records.len());
        for id in 0..records.len() {
            let Some(mut record) = records.lock(id) else {
                continue;
            };
            if record.status == ProxyStatus::Checking {
                debug!(id, proxy = %record.address, "force-failing in-flight record");
                record.status = ProxyStatus::Failed;
                record.last_checked_at = Some(now);
            }
            statuses.push(record.status);
        }
        inner.tally.recompute(statuses);
    }
}

async fn run_worker<P: ProxyProbe>(
    worker: usize,
    state: Arc<RunState>,
    records: RecordSet,
    probe: Arc<P>,
    timeout: Duration,
) {
    while let Some(claim) = state.claim(&records) {
        debug!(worker, id = claim.id, proxy = %claim.target.address, "claimed record");
        let result = probe.probe(&claim.target, timeout).await;
        if !state.commit(&records, claim.id, result, timeout) {
            debug!(worker, id = claim.id, "run stopped, discarding result");
            break;
        }
    }
    debug!(worker, "worker exiting");
}

/// Drives probes over a record set with a bounded number of workers
pub struct ValidationPool<P> {
    probe: Arc<P>,
    config: PoolConfig,
}

impl<P: ProxyProbe> ValidationPool<P> {
    pub fn new(probe: P, config: PoolConfig) -> Self {
        Self::with_shared_probe(Arc::new(probe), config)
    }

    pub fn with_shared_probe(probe: Arc<P>, config: PoolConfig) -> Self {
        Self { probe, config }
    }

    /// Reset every record to pending and start a run over them
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, records: &RecordSet) -> RunHandle {
        records.reset_all();

        let total = records.len();
        let state = Arc::new(RunState::new(total));
        let worker_count = self.config.concurrency.max(1).min(total);

        info!(
            total,
            workers = worker_count,
            timeout_secs = self.config.timeout.as_secs(),
            "starting validation run"
        );

        let workers = (0..worker_count)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&state),
                    records.clone(),
                    Arc::clone(&self.probe),
                    self.config.timeout,
                ))
            })
            .collect();

        RunHandle {
            state,
            records: records.clone(),
            workers,
        }
    }
}

/// Cloneable stop button for a run
#[derive(Clone)]
pub struct RunCanceller {
    state: Arc<RunState>,
    records: RecordSet,
}

impl RunCanceller {
    /// Stop the run; in-flight records end as failed
    pub fn cancel(&self) -> bool {
        self.state.stop(&self.records)
    }
}

/// A run in progress
pub struct RunHandle {
    state: Arc<RunState>,
    records: RecordSet,
    workers: Vec<JoinHandle<()>>,
}

impl RunHandle {
    /// Number of workers started for this run
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn aggregator(&self) -> ResultAggregator {
        ResultAggregator::new(Arc::clone(&self.state))
    }

    pub fn canceller(&self) -> RunCanceller {
        RunCanceller {
            state: Arc::clone(&self.state),
            records: self.records.clone(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Stop the run; see [`RunCanceller::cancel`]
    pub fn stop(&self) -> bool {
        self.state.stop(&self.records)
    }

    /// Wait for every worker to exit and return the final counters
    pub async fn wait(self) -> Snapshot {
        for result in join_all(self.workers).await {
            if let Err(e) = result {
                warn!(error = %e, "validation worker ended abnormally");
            }
        }

        // Catches records left in flight by a worker that died mid-probe
        self.state.stop(&self.records);
        self.state.snapshot()
    }
}
