//! Liveness monitor: periodic health probing of the camera device
//!
//! One probe is issued as soon as the monitor starts and then one per period.
//! Every probe ends in exactly one [`HealthStatus`] replacement: `ok` is true
//! only for a 2xx answer, anything else (transport error, timeout, other
//! status) publishes `ok=false`. Stopping or restarting the monitor discards
//! the result of any probe still in flight.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::endpoints::health_url;
use crate::io::HttpClient;
use crate::scheduler::{ScheduleHandle, Scheduler};

/// Default probe period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Consecutive failures after which a warning is logged
const FAILURE_WARN_THRESHOLD: u32 = 3;

/// Published liveness of the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub ok: bool,
    /// Completion time of the last probe, in Unix epoch milliseconds
    pub last_checked_at: Option<u64>,
}

#[derive(Default)]
struct Cycle {
    generation: u64,
    running: bool,
    timer: Option<ScheduleHandle>,
    cancel: Option<CancellationToken>,
    last_stamp_ms: u64,
    checks: u64,
    consecutive_failures: u32,
}

/// Periodically probes `{base}/api/health` and publishes a [`HealthStatus`]
pub struct LivenessMonitor {
    http: Arc<dyn HttpClient>,
    scheduler: Arc<dyn Scheduler>,
    period: Duration,
    probe_timeout: Duration,
    status_tx: watch::Sender<HealthStatus>,
    cycle: Arc<Mutex<Cycle>>,
}

impl std::fmt::Debug for LivenessMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessMonitor")
            .field("period", &self.period)
            .field("probe_timeout", &self.probe_timeout)
            .field("status", &*self.status_tx.borrow())
            .finish()
    }
}

impl LivenessMonitor {
    /// Create a stopped monitor. `probe_timeout` is clamped to `period` so a
    /// probe never outlives its own cycle.
    pub fn new(
        http: Arc<dyn HttpClient>,
        scheduler: Arc<dyn Scheduler>,
        period: Duration,
        probe_timeout: Duration,
    ) -> Self {
        let (status_tx, _) = watch::channel(HealthStatus::default());
        Self {
            http,
            scheduler,
            period,
            probe_timeout: probe_timeout.min(period),
            status_tx,
            cycle: Arc::new(Mutex::new(Cycle::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cycle> {
        lock_cycle(&self.cycle)
    }

    /// Start probing `base`. Any previous cycle is stopped first.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start(&self, base: &str) {
        self.stop();

        let url = health_url(base);
        let cancel = CancellationToken::new();
        let generation = {
            let mut cycle = self.lock();
            cycle.generation += 1;
            cycle.running = true;
            cycle.consecutive_failures = 0;
            cycle.cancel = Some(cancel.clone());
            cycle.generation
        };

        tracing::info!("Liveness monitor started for {} every {:?}", url, self.period);

        let probe = Probe {
            http: Arc::clone(&self.http),
            url,
            timeout: self.probe_timeout,
            status_tx: self.status_tx.clone(),
            cycle: Arc::clone(&self.cycle),
            generation,
            cancel,
            runtime: tokio::runtime::Handle::current(),
        };

        probe.fire();
        let timer = self
            .scheduler
            .schedule(self.period, Box::new(move || probe.fire()));

        let mut cycle = self.lock();
        if cycle.running && cycle.generation == generation {
            cycle.timer = Some(timer);
        }
    }

    /// Stop probing. Once this returns no further status is published, even by
    /// a probe that is still in flight.
    pub fn stop(&self) {
        let (timer, cancel) = {
            let mut cycle = self.lock();
            if !cycle.running {
                return;
            }
            cycle.running = false;
            (cycle.timer.take(), cycle.cancel.take())
        };

        if let Some(timer) = timer {
            timer.cancel();
        }
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        tracing::debug!("Liveness monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// The most recently published status
    pub fn status(&self) -> HealthStatus {
        *self.status_tx.borrow()
    }

    /// Receiver that observes every status replacement
    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.status_tx.subscribe()
    }

    /// Number of statuses published since creation
    pub fn checks_published(&self) -> u64 {
        self.lock().checks
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock_cycle(cycle: &Mutex<Cycle>) -> MutexGuard<'_, Cycle> {
    cycle.lock().unwrap_or_else(PoisonError::into_inner)
}

fn current_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Everything one probe cycle needs, cloned into each spawned probe
#[derive(Clone)]
struct Probe {
    http: Arc<dyn HttpClient>,
    url: String,
    timeout: Duration,
    status_tx: watch::Sender<HealthStatus>,
    cycle: Arc<Mutex<Cycle>>,
    generation: u64,
    cancel: CancellationToken,
    runtime: tokio::runtime::Handle,
}

impl Probe {
    fn fire(&self) {
        let probe = self.clone();
        self.runtime.spawn(async move { probe.run().await });
    }

    async fn run(self) {
        let ok = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!("Probe of {} discarded", self.url);
                return;
            }
            ok = self.check() => ok,
        };
        self.publish(ok);
    }

    async fn check(&self) -> bool {
        match tokio::time::timeout(self.timeout, self.http.get_uncached(&self.url)).await {
            Ok(Ok(response)) => {
                if !response.is_success() {
                    tracing::debug!("Probe {} -> status {}", self.url, response.status);
                }
                response.is_success()
            }
            Ok(Err(e)) => {
                tracing::debug!("Probe {} failed: {}", self.url, e);
                false
            }
            Err(_) => {
                tracing::debug!("Probe {} timed out after {:?}", self.url, self.timeout);
                false
            }
        }
    }

    fn publish(&self, ok: bool) {
        let mut cycle = lock_cycle(&self.cycle);
        if !cycle.running || cycle.generation != self.generation {
            tracing::debug!("Probe of {} finished after stop, result dropped", self.url);
            return;
        }

        let stamp = current_epoch_ms().max(cycle.last_stamp_ms + 1);
        cycle.last_stamp_ms = stamp;
        cycle.checks += 1;

        let previous = self.status_tx.send_replace(HealthStatus {
            ok,
            last_checked_at: Some(stamp),
        });

        if ok {
            if cycle.consecutive_failures >= FAILURE_WARN_THRESHOLD {
                tracing::info!(
                    "{} reachable again after {} failed checks",
                    self.url,
                    cycle.consecutive_failures
                );
            }
            cycle.consecutive_failures = 0;
        } else {
            cycle.consecutive_failures += 1;
            if cycle.consecutive_failures == FAILURE_WARN_THRESHOLD {
                tracing::warn!(
                    "{} has failed {} consecutive checks",
                    self.url,
                    cycle.consecutive_failures
                );
            }
        }

        tracing::debug!(
            "Health {}: ok={} (was {})",
            self.url,
            ok,
            previous.ok
        );
    }
}
