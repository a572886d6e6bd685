//! Native stream attacher
//!
//! Drives a [`StreamViewer`] against the device: opens the current stream
//! reference, reports success once a 2xx response arrives, then reads the
//! body until the connection ends or errors. Any end of the stream is a
//! failure; the viewer rotates the cache token and the attacher re-attaches
//! with the new reference. A base change aborts the current connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::io::HttpClient;
use crate::stream::{Attempt, StreamViewer};
use crate::CamviewError;

/// Keeps a connection to the camera stream attached
pub struct StreamAttacher {
    http: Arc<dyn HttpClient>,
    viewer: Arc<StreamViewer>,
    retry_delay: Duration,
}

enum Interrupted {
    Cancelled,
    Invalidated,
}

impl StreamAttacher {
    pub fn new(
        http: Arc<dyn HttpClient>,
        viewer: Arc<StreamViewer>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            http,
            viewer,
            retry_delay,
        }
    }

    /// Run on a background task until `cancel` fires
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut generation = self.viewer.watch_generation();

        'outer: loop {
            let mut attempt = match self.viewer.current_attempt() {
                Some(attempt) => attempt,
                None => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        changed = generation.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                    continue;
                }
            };

            loop {
                let cause = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'outer,
                    changed = generation.changed() => {
                        if changed.is_err() {
                            break 'outer;
                        }
                        tracing::debug!("Dropping stream {} after invalidation", attempt.url);
                        continue 'outer;
                    }
                    cause = self.attach(&attempt) => cause,
                };

                tracing::debug!("Stream attempt {} ended: {}", attempt.url, cause);
                if !self.viewer.on_attach_result(&attempt, false) {
                    continue 'outer;
                }

                match self.pause(&cancel, &mut generation).await {
                    Some(Interrupted::Cancelled) => break 'outer,
                    Some(Interrupted::Invalidated) => continue 'outer,
                    None => {}
                }

                match self.viewer.retry(attempt.generation) {
                    Some(next) => attempt = next,
                    None => continue 'outer,
                }
            }
        }

        tracing::debug!("Stream attacher stopped");
    }

    async fn pause(
        &self,
        cancel: &CancellationToken,
        generation: &mut tokio::sync::watch::Receiver<u64>,
    ) -> Option<Interrupted> {
        if self.retry_delay.is_zero() {
            return None;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Some(Interrupted::Cancelled),
            changed = generation.changed() => match changed {
                Ok(()) => Some(Interrupted::Invalidated),
                Err(_) => Some(Interrupted::Cancelled),
            },
            _ = tokio::time::sleep(self.retry_delay) => None,
        }
    }

    /// Attach once and return the reason the attachment ended
    async fn attach(&self, attempt: &Attempt) -> CamviewError {
        match self.read_stream(attempt).await {
            Ok(bytes) => CamviewError::Stream(format!(
                "{} closed by server after {} bytes",
                attempt.url, bytes
            )),
            Err(e) => e,
        }
    }

    async fn read_stream(&self, attempt: &Attempt) -> crate::Result<u64> {
        let response = self.http.open_stream(&attempt.url).await?;
        if !(200..300).contains(&response.status) {
            return Err(CamviewError::Stream(format!(
                "{} answered {}",
                attempt.url, response.status
            )));
        }

        self.viewer.on_attach_result(attempt, true);

        let mut body = response.body;
        let mut bytes = 0u64;
        while let Some(chunk) = body.next_chunk().await? {
            bytes += chunk.len() as u64;
        }
        Ok(bytes)
    }
}
