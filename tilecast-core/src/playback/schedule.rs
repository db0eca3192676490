//! Periodic task drivers for playback.
//!
//! A scheduled job runs once immediately and then every `period_ticks` host
//! ticks until its [`TaskHandle`] is cancelled or dropped. Runs of one job
//! never overlap.

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::Context as _;
use crossbeam_channel::{Sender, bounded, select, tick};

use crate::foundation::error::{TilecastError, TilecastResult};

/// Work run on every firing of a scheduled task.
pub type Job = Box<dyn FnMut() + Send + 'static>;

/// Drives repeating jobs at host tick granularity.
pub trait Scheduler: Send + Sync {
    /// Host tick granularity.
    fn ticks_per_second(&self) -> u32;

    /// Run `job` now and then every `period_ticks` ticks (at least one).
    fn schedule_repeating(&self, period_ticks: u64, job: Job) -> TilecastResult<TaskHandle>;
}

/// Cancellation handle for a scheduled job. Dropping it cancels the job.
#[derive(Debug)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
    wake: Option<Sender<()>>,
}

impl TaskHandle {
    fn new(cancelled: Arc<AtomicBool>, wake: Option<Sender<()>>) -> Self {
        Self { cancelled, wake }
    }

    /// Stop future firings. Safe to call any number of times.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(wake) = &self.wake {
            let _ = wake.try_send(());
        }
    }

    /// Whether [`cancel`](Self::cancel) has run.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// One OS thread per scheduled job, paced by a `crossbeam_channel::tick`.
#[derive(Debug)]
pub struct ThreadScheduler {
    ticks_per_second: u32,
    next_id: AtomicU64,
}

impl ThreadScheduler {
    /// Fails on a zero tick rate.
    pub fn new(ticks_per_second: u32) -> TilecastResult<Self> {
        if ticks_per_second == 0 {
            return Err(TilecastError::validation("ticks_per_second must be > 0"));
        }
        Ok(Self {
            ticks_per_second,
            next_id: AtomicU64::new(0),
        })
    }

    /// Wall-clock length of one tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs(1) / self.ticks_per_second
    }
}

impl Scheduler for ThreadScheduler {
    fn ticks_per_second(&self) -> u32 {
        self.ticks_per_second
    }

    fn schedule_repeating(&self, period_ticks: u64, mut job: Job) -> TilecastResult<TaskHandle> {
        let ticks = u32::try_from(period_ticks.max(1)).unwrap_or(u32::MAX);
        let period = self.tick_duration().saturating_mul(ticks);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let cancelled = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx) = bounded::<()>(1);
        let flag = Arc::clone(&cancelled);

        thread::Builder::new()
            .name(format!("tilecast-tick-{id}"))
            .spawn(move || {
                tracing::debug!(task = id, ?period, "ticker started");
                let ticker = tick(period);
                if !flag.load(Ordering::Acquire) {
                    job();
                }
                loop {
                    select! {
                        // Fires on cancel and when the handle is dropped.
                        recv(wake_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            if flag.load(Ordering::Acquire) {
                                break;
                            }
                            job();
                        }
                    }
                }
                tracing::debug!(task = id, "ticker stopped");
            })
            .context("spawn ticker thread")?;

        Ok(TaskHandle::new(cancelled, Some(wake_tx)))
    }
}

struct ManualTask {
    period: u64,
    next_due: u64,
    cancelled: Arc<AtomicBool>,
    job: Arc<Mutex<Job>>,
}

#[derive(Default)]
struct ManualState {
    now: u64,
    tasks: Vec<ManualTask>,
}

/// Scheduler whose clock only moves when [`ManualScheduler::advance`] is called.
///
/// Jobs run on the calling thread, outside the scheduler's own lock.
pub struct ManualScheduler {
    ticks_per_second: u32,
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    /// Clock at tick 0 with no tasks. A zero rate is treated as one.
    pub fn new(ticks_per_second: u32) -> Self {
        Self {
            ticks_per_second: ticks_per_second.max(1),
            state: Mutex::new(ManualState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ticks elapsed so far.
    pub fn now(&self) -> u64 {
        self.lock().now
    }

    /// Jobs not yet cancelled.
    pub fn active_tasks(&self) -> usize {
        self.lock()
            .tasks
            .iter()
            .filter(|t| !t.cancelled.load(Ordering::Acquire))
            .count()
    }

    /// Run `ticks` host ticks, firing every job that comes due.
    pub fn advance(&self, ticks: u64) {
        for _ in 0..ticks {
            let due: Vec<_> = {
                let mut st = self.lock();
                let now = st.now;
                st.tasks.retain(|t| !t.cancelled.load(Ordering::Acquire));
                let due = st
                    .tasks
                    .iter_mut()
                    .filter(|t| t.next_due <= now)
                    .map(|t| {
                        t.next_due = now + t.period;
                        (Arc::clone(&t.job), Arc::clone(&t.cancelled))
                    })
                    .collect();
                st.now += 1;
                due
            };

            for (job, cancelled) in due {
                if cancelled.load(Ordering::Acquire) {
                    continue;
                }
                let mut job = job.lock().unwrap_or_else(PoisonError::into_inner);
                (&mut **job)();
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn ticks_per_second(&self) -> u32 {
        self.ticks_per_second
    }

    fn schedule_repeating(&self, period_ticks: u64, job: Job) -> TilecastResult<TaskHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut st = self.lock();
        let now = st.now;
        st.tasks.push(ManualTask {
            period: period_ticks.max(1),
            next_due: now,
            cancelled: Arc::clone(&cancelled),
            job: Arc::new(Mutex::new(job)),
        });
        Ok(TaskHandle::new(cancelled, None))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/playback/schedule.rs"]
mod tests;
