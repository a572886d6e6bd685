//! Camview - camera stream viewer
//!
//! Probes a camera device's health endpoint on a fixed cadence, keeps its
//! MJPEG stream attached with cache-defeating recovery, and serves a local
//! viewer page showing both.

pub mod attach;
pub mod config;
pub mod dashboard;
pub mod endpoints;
pub mod error;
pub mod io;
pub mod liveness;
pub mod scheduler;
pub mod stream;
pub mod viewer;

pub use config::{load_config, Config};
pub use error::{CamviewError, Result};
pub use viewer::{Viewer, ViewerStatus};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::io::ReqwestHttpClient;
use crate::scheduler::TokioScheduler;

/// Run the viewer with the given configuration until Ctrl-C
pub async fn run(config: Config) -> Result<()> {
    config.validate()?;

    let http: Arc<dyn io::HttpClient> = Arc::new(ReqwestHttpClient::new());
    let cancel = CancellationToken::new();
    let viewer = Arc::new(Viewer::new(http, Arc::new(TokioScheduler), &config));

    // Setup shutdown handler
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
        }
        cancel_for_signal.cancel();
    });

    if config.stream.enabled && config.dashboard.enabled {
        tracing::warn!(
            "Native stream attacher and viewer page both enabled; a single-client camera will serve only one of them"
        );
    }

    viewer.start();

    // Start dashboard if enabled
    if config.dashboard.enabled {
        let dashboard_port = config.dashboard.port;
        let dashboard_viewer = Arc::clone(&viewer);
        let cancel_for_dashboard = cancel.clone();

        tokio::spawn(async move {
            let router = dashboard::build_router(dashboard_viewer);
            let addr = SocketAddr::from(([0, 0, 0, 0], dashboard_port));
            tracing::info!("Viewer page listening on http://{}", addr);

            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!(
                        "Failed to bind viewer page to port {}: {}. Continuing without it.",
                        dashboard_port,
                        e
                    );
                    return;
                }
            };

            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    cancel_for_dashboard.cancelled().await;
                })
                .await
                .ok();

            tracing::debug!("Viewer page stopped");
        });
    }

    tracing::info!("Camera viewer started for {:?}", viewer.base());

    cancel.cancelled().await;
    viewer.stop().await;

    Ok(())
}
