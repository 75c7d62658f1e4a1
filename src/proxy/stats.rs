//! Run counters and the read-only progress view over them

use crate::proxy::models::ProxyStatus;
use crate::proxy::pool::RunState;
use std::sync::Arc;

/// Mutable counters for one run
///
/// Only the pool mutates a tally, and always under the run lock, so the four
/// fields move together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub checked: usize,
    pub working: usize,
    pub failed: usize,
    pub checking: usize,
}

impl Tally {
    /// A record was claimed and its probe is about to start
    pub fn begin_check(&mut self) {
        self.checking += 1;
    }

    /// A claimed record reached a terminal state
    pub fn finish_check(&mut self, working: bool) {
        self.checking = self.checking.saturating_sub(1);
        self.checked += 1;
        if working {
            self.working += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Rebuild the counters from record states after a forced sweep
    pub fn recompute<I>(&mut self, statuses: I)
    where
        I: IntoIterator<Item = ProxyStatus>,
    {
        let mut tally = Tally::default();
        for status in statuses {
            match status {
                ProxyStatus::Working => tally.working += 1,
                ProxyStatus::Failed => tally.failed += 1,
                ProxyStatus::Checking => tally.checking += 1,
                ProxyStatus::Pending => {}
            }
        }
        tally.checked = tally.working + tally.failed;
        *self = tally;
    }
}

/// Point-in-time view of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub total: usize,
    pub checked: usize,
    pub working: usize,
    pub failed: usize,
    pub checking: usize,
    pub progress_percent: u8,
    pub running: bool,
}

impl Snapshot {
    pub fn new(total: usize, tally: Tally, running: bool) -> Self {
        Self {
            total,
            checked: tally.checked,
            working: tally.working,
            failed: tally.failed,
            checking: tally.checking,
            progress_percent: progress_percent(tally.checked, total),
            running,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.checked == self.total
    }
}

/// Rounded percentage of checked records; an empty run reports 0
pub fn progress_percent(checked: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (checked as f64 / total as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

/// Read-only handle onto a run's counters, for presentation layers
#[derive(Clone)]
pub struct ResultAggregator {
    state: Arc<RunState>,
}

impl ResultAggregator {
    pub(crate) fn new(state: Arc<RunState>) -> Self {
        Self { state }
    }

    /// Consistent copy of all counters
    pub fn snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }
}
