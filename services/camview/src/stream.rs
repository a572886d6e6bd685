//! Stream viewer: attach state and cache-defeating recovery
//!
//! The viewer owns the reference to the camera stream and reacts to attach
//! results. A failed attach flags the stream as failed and rotates the
//! cache-defeat token in the same transition, so the retry that follows is a
//! fresh request rather than a replay of the failed one. Retry is unbounded.
//!
//! Results are reported against the [`Attempt`] they belong to. Results for
//! an attempt that has been superseded (base changed, token rotated, viewer
//! stopped) are ignored.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::endpoints::{normalize_base, stream_reference};

/// Attach state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Attached,
    Failed,
}

/// Published stream state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamState {
    pub url: String,
    pub cache_token: Option<u64>,
    pub failed: bool,
}

/// One attach attempt against a specific stream reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub generation: u64,
    pub url: String,
}

struct Inner {
    base: String,
    generation: u64,
    mounted: bool,
    phase: Phase,
    cache_token: Option<u64>,
    last_token: u64,
    failed: bool,
    failures: u64,
}

impl Inner {
    fn url(&self) -> String {
        stream_reference(&self.base, self.cache_token)
    }

    fn snapshot(&self) -> StreamState {
        StreamState {
            url: self.url(),
            cache_token: self.cache_token,
            failed: self.failed,
        }
    }

    fn is_current(&self, attempt: &Attempt) -> bool {
        self.mounted && attempt.generation == self.generation && attempt.url == self.url()
    }

    fn next_token(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let token = now.max(self.last_token + 1);
        self.last_token = token;
        token
    }
}

/// Owns the stream reference and its recovery policy
pub struct StreamViewer {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<StreamState>,
    generation_tx: watch::Sender<u64>,
}

impl std::fmt::Debug for StreamViewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamViewer")
            .field("state", &*self.state_tx.borrow())
            .finish()
    }
}

impl Default for StreamViewer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamViewer {
    /// Create an unmounted viewer for the same-origin base
    pub fn new() -> Self {
        let inner = Inner {
            base: String::new(),
            generation: 0,
            mounted: false,
            phase: Phase::Attached,
            cache_token: None,
            last_token: 0,
            failed: false,
            failures: 0,
        };
        let (state_tx, _) = watch::channel(inner.snapshot());
        let (generation_tx, _) = watch::channel(0);
        Self {
            inner: Mutex::new(inner),
            state_tx,
            generation_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn invalidate(&self, inner: &mut Inner) {
        inner.generation += 1;
        self.generation_tx.send_replace(inner.generation);
        self.state_tx.send_replace(inner.snapshot());
    }

    /// Mount the viewer on `base`
    pub fn start(&self, base: &str) {
        let mut inner = self.lock();
        inner.mounted = true;
        Self::reset(&mut inner, base);
        self.invalidate(&mut inner);
        tracing::info!("Stream viewer attached to {}", inner.url());
    }

    /// Point the viewer at a new base. Any retry tied to the old base is
    /// invalidated and the stream reference is recomputed without a token.
    pub fn set_base(&self, base: &str) {
        let mut inner = self.lock();
        Self::reset(&mut inner, base);
        self.invalidate(&mut inner);
        tracing::debug!("Stream reference now {}", inner.url());
    }

    fn reset(inner: &mut Inner, base: &str) {
        inner.base = normalize_base(base);
        inner.cache_token = None;
        inner.failed = false;
        inner.phase = Phase::Attached;
    }

    /// Release the attachment; later results are ignored
    pub fn stop(&self) {
        let mut inner = self.lock();
        if !inner.mounted {
            return;
        }
        inner.mounted = false;
        self.invalidate(&mut inner);
        tracing::debug!("Stream viewer released");
    }

    pub fn is_mounted(&self) -> bool {
        self.lock().mounted
    }

    pub fn state(&self) -> StreamState {
        self.state_tx.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Failures observed since creation
    pub fn failures(&self) -> u64 {
        self.lock().failures
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.state_tx.subscribe()
    }

    /// Receiver that changes whenever outstanding attempts are invalidated
    pub fn watch_generation(&self) -> watch::Receiver<u64> {
        self.generation_tx.subscribe()
    }

    /// The attempt to issue for the current reference, if mounted
    pub fn current_attempt(&self) -> Option<Attempt> {
        let inner = self.lock();
        inner.mounted.then(|| Attempt {
            generation: inner.generation,
            url: inner.url(),
        })
    }

    /// Whether `attempt` still matches the current reference
    pub fn is_current(&self, attempt: &Attempt) -> bool {
        self.lock().is_current(attempt)
    }

    /// Apply the result of `attempt`. Returns false when the attempt was
    /// superseded and the result ignored.
    pub fn on_attach_result(&self, attempt: &Attempt, success: bool) -> bool {
        let mut inner = self.lock();
        if !inner.is_current(attempt) {
            tracing::debug!("Ignoring result for stale stream attempt {}", attempt.url);
            return false;
        }

        if success {
            if inner.failed {
                tracing::info!("Stream {} recovered", attempt.url);
            }
            inner.failed = false;
            inner.phase = Phase::Attached;
        } else {
            let token = inner.next_token();
            inner.cache_token = Some(token);
            inner.failed = true;
            inner.phase = Phase::Failed;
            inner.failures += 1;
            tracing::warn!(
                "Stream {} failed, retrying as {}",
                attempt.url,
                inner.url()
            );
        }

        self.state_tx.send_replace(inner.snapshot());
        true
    }

    /// Issue the retry after a failure: `Failed -> Attached`. Returns the
    /// attempt to make, or `None` when `generation` is no longer current.
    pub fn retry(&self, generation: u64) -> Option<Attempt> {
        let mut inner = self.lock();
        if !inner.mounted || inner.generation != generation {
            return None;
        }
        inner.phase = Phase::Attached;
        Some(Attempt {
            generation,
            url: inner.url(),
        })
    }
}
