//! Viewer: owns the base address and both components
//!
//! The base address is configuration shared by the liveness monitor and the
//! stream viewers. Neither component keeps a copy beyond its current cycle: a
//! new base restarts the monitor and invalidates the stream attachments.
//!
//! The viewer page and the native attacher are separate stream clients, each
//! with its own [`StreamViewer`]. Only the page's state is rendered.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::attach::StreamAttacher;
use crate::config::Config;
use crate::endpoints::{health_url, normalize_base, resolve_base};
use crate::io::HttpClient;
use crate::liveness::{HealthStatus, LivenessMonitor};
use crate::scheduler::Scheduler;
use crate::stream::{StreamState, StreamViewer};

/// Everything the viewer page needs in one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerStatus {
    pub base: String,
    pub health_url: String,
    pub health: HealthStatus,
    /// State of the stream the page displays
    pub stream: StreamState,
    /// State of the native attacher's connection, when it runs
    pub native_stream: Option<StreamState>,
}

#[derive(Default)]
struct Lifecycle {
    running: bool,
    attacher: Option<(CancellationToken, JoinHandle<()>)>,
}

struct NativeStream {
    stream: Arc<StreamViewer>,
    retry_delay: Duration,
}

/// Camera viewer: liveness monitor plus stream viewers on a shared base
pub struct Viewer {
    http: Arc<dyn HttpClient>,
    device_origin: String,
    base_tx: watch::Sender<String>,
    monitor: LivenessMonitor,
    page_stream: Arc<StreamViewer>,
    native: Option<NativeStream>,
    lifecycle: Mutex<Lifecycle>,
}

impl std::fmt::Debug for Viewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewer")
            .field("base", &*self.base_tx.borrow())
            .field("device_origin", &self.device_origin)
            .field("monitor", &self.monitor)
            .field("page_stream", &self.page_stream)
            .field("native_stream", &self.native.as_ref().map(|n| &n.stream))
            .finish()
    }
}

impl Viewer {
    pub fn new(http: Arc<dyn HttpClient>, scheduler: Arc<dyn Scheduler>, config: &Config) -> Self {
        let monitor = LivenessMonitor::new(
            Arc::clone(&http),
            scheduler,
            config.liveness.poll_interval(),
            config.liveness.probe_timeout(),
        );
        let (base_tx, _) = watch::channel(normalize_base(&config.base));
        let native = config.stream.enabled.then(|| NativeStream {
            stream: Arc::new(StreamViewer::new()),
            retry_delay: config.stream.retry_delay(),
        });

        Self {
            http,
            device_origin: normalize_base(&config.device_origin),
            base_tx,
            monitor,
            page_stream: Arc::new(StreamViewer::new()),
            native,
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current base address, already normalized
    pub fn base(&self) -> String {
        self.base_tx.borrow().clone()
    }

    /// Address requests from this process go to
    pub fn device_base(&self) -> String {
        resolve_base(&self.base(), &self.device_origin)
    }

    /// Receiver that observes base address changes
    pub fn watch_base(&self) -> watch::Receiver<String> {
        self.base_tx.subscribe()
    }

    pub fn http(&self) -> &Arc<dyn HttpClient> {
        &self.http
    }

    pub fn monitor(&self) -> &LivenessMonitor {
        &self.monitor
    }

    /// The stream the viewer page displays
    pub fn stream(&self) -> &Arc<StreamViewer> {
        &self.page_stream
    }

    /// The native attacher's stream, when enabled
    pub fn native_stream(&self) -> Option<&Arc<StreamViewer>> {
        self.native.as_ref().map(|native| &native.stream)
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Mount the viewer: start probing and attach the streams
    pub fn start(&self) {
        let mut lifecycle = self.lock();
        if lifecycle.running {
            return;
        }
        lifecycle.running = true;

        let base = self.base();
        let device_base = resolve_base(&base, &self.device_origin);
        self.monitor.start(&device_base);
        self.page_stream.start(&base);

        if let Some(native) = &self.native {
            native.stream.start(&device_base);
            let cancel = CancellationToken::new();
            let handle = StreamAttacher::new(
                Arc::clone(&self.http),
                Arc::clone(&native.stream),
                native.retry_delay,
            )
            .spawn(cancel.clone());
            lifecycle.attacher = Some((cancel, handle));
        }
    }

    /// Replace the base address. Takes effect immediately when running and
    /// at the next start otherwise. Returns the normalized base.
    pub fn set_base(&self, base: &str) -> String {
        let base = normalize_base(base);
        let lifecycle = self.lock();
        self.base_tx.send_replace(base.clone());
        tracing::info!("Base address set to {:?}", base);

        if lifecycle.running {
            let device_base = resolve_base(&base, &self.device_origin);
            self.monitor.start(&device_base);
            self.page_stream.set_base(&base);
            if let Some(native) = &self.native {
                native.stream.set_base(&device_base);
            }
        }
        base
    }

    /// Unmount the viewer: stop probing, release the streams, and wait for
    /// the attacher to finish
    pub async fn stop(&self) {
        let attacher = {
            let mut lifecycle = self.lock();
            if !lifecycle.running {
                return;
            }
            lifecycle.running = false;
            self.monitor.stop();
            self.page_stream.stop();
            if let Some(native) = &self.native {
                native.stream.stop();
            }
            lifecycle.attacher.take()
        };

        if let Some((cancel, handle)) = attacher {
            cancel.cancel();
            if let Err(e) = handle.await {
                tracing::warn!("Stream attacher ended abnormally: {}", e);
            }
        }
        tracing::info!("Viewer stopped");
    }

    pub fn status(&self) -> ViewerStatus {
        let base = self.base();
        ViewerStatus {
            health_url: health_url(&resolve_base(&base, &self.device_origin)),
            base,
            health: self.monitor.status(),
            stream: self.page_stream.state(),
            native_stream: self.native_stream().map(|stream| stream.state()),
        }
    }
}
