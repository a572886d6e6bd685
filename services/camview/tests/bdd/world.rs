//! BDD test world for the camera viewer

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cucumber::World;
use tokio::sync::Notify;

use camview::io::{HttpClient, HttpResponse, StreamResponse};
use camview::liveness::LivenessMonitor;
use camview::scheduler::ManualScheduler;
use camview::stream::{Attempt, StreamViewer};
use camview::CamviewError;

/// A camera device whose health endpoint answers from a script
#[derive(Debug, Default)]
pub struct FakeDevice {
    pub health: Mutex<VecDeque<u16>>,
    pub requests: Mutex<Vec<String>>,
    pub hold: AtomicBool,
    pub release: Notify,
}

impl FakeDevice {
    pub fn is_holding(&self) -> bool {
        self.hold.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<String> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl HttpClient for FakeDevice {
    async fn get_uncached(&self, url: &str) -> camview::Result<HttpResponse> {
        self.requests.lock().unwrap().push(url.to_string());
        if self.is_holding() {
            self.release.notified().await;
        }
        let status = self.health.lock().unwrap().pop_front().unwrap_or(200);
        Ok(HttpResponse { status })
    }

    async fn open_stream(&self, url: &str) -> camview::Result<StreamResponse> {
        Err(CamviewError::Http(format!("GET {} failed", url)))
    }
}

#[derive(Debug, Default, World)]
pub struct CamviewWorld {
    // Endpoint composition
    pub base: Option<String>,

    // Liveness testing
    pub device: Option<Arc<FakeDevice>>,
    pub scheduler: Option<ManualScheduler>,
    pub monitor: Option<LivenessMonitor>,
    pub stamps: Vec<u64>,

    // Stream testing
    pub stream: Option<StreamViewer>,
    pub failed_attempt: Option<Attempt>,
    pub retry_attempt: Option<Attempt>,
    pub previous_token: Option<u64>,
    pub references: Vec<String>,
}
