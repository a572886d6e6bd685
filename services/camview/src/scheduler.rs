//! Repeating-timer abstraction
//!
//! The liveness probe loop never touches a clock directly. It asks a
//! [`Scheduler`] to invoke a callback once per period and keeps the returned
//! [`ScheduleHandle`] to cancel it. [`TokioScheduler`] is the production
//! implementation; [`ManualScheduler`] advances virtual time on demand so the
//! probe cadence can be exercised without real delays.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Callback invoked on every elapsed period
pub type Tick = Box<dyn FnMut() + Send + 'static>;

/// Source of repeating timers
pub trait Scheduler: Send + Sync + fmt::Debug {
    /// Invoke `tick` every `period`. The first invocation happens one full
    /// period after scheduling.
    fn schedule(&self, period: Duration, tick: Tick) -> ScheduleHandle;
}

/// Cancels the associated repeating timer when cancelled or dropped
#[derive(Debug)]
pub struct ScheduleHandle {
    cancel: CancellationToken,
}

impl ScheduleHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn clamp_period(period: Duration) -> Duration {
    period.max(Duration::from_millis(1))
}

/// Scheduler backed by the tokio timer wheel
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, period: Duration, mut tick: Tick) -> ScheduleHandle {
        let period = clamp_period(period);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => tick(),
                }
            }
            tracing::trace!("Repeating timer ({:?}) released", period);
        });

        ScheduleHandle::new(cancel)
    }
}

struct ManualTask {
    period: Duration,
    next_due: Duration,
    tick: Tick,
    cancel: CancellationToken,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    tasks: Vec<ManualTask>,
}

impl ManualClock {
    fn prune(&mut self) {
        self.tasks.retain(|t| !t.cancel.is_cancelled());
    }

    /// Index of the earliest live task due at or before `limit`
    fn next_due(&mut self, limit: Duration) -> Option<usize> {
        self.prune();
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.next_due <= limit)
            .min_by_key(|(_, t)| t.next_due)
            .map(|(i, _)| i)
    }
}

/// Scheduler driven by explicit calls to [`ManualScheduler::advance`]
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: Arc<Mutex<ManualClock>>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = self.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &clock.now)
            .field("tasks", &clock.tasks.len())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualClock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Virtual time elapsed since creation
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of timers that are still live
    pub fn active_count(&self) -> usize {
        let mut clock = self.lock();
        clock.prune();
        clock.tasks.len()
    }

    /// Move virtual time forward, firing every tick that falls due in order.
    /// Callbacks run without the internal lock held, so they may schedule or
    /// cancel timers themselves.
    pub fn advance(&self, by: Duration) {
        let target = self.lock().now + by;

        loop {
            let mut task = {
                let mut clock = self.lock();
                let Some(index) = clock.next_due(target) else {
                    break;
                };
                let task = clock.tasks.swap_remove(index);
                clock.now = task.next_due;
                task
            };

            (task.tick)();
            task.next_due += task.period;

            if !task.cancel.is_cancelled() {
                self.lock().tasks.push(task);
            }
        }

        self.lock().now = target;
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, period: Duration, tick: Tick) -> ScheduleHandle {
        let period = clamp_period(period);
        let cancel = CancellationToken::new();
        let mut clock = self.lock();
        let next_due = clock.now + period;
        clock.tasks.push(ManualTask {
            period,
            next_due,
            tick,
            cancel: cancel.clone(),
        });
        ScheduleHandle::new(cancel)
    }
}
