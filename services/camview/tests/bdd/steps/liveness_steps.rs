//! BDD step definitions for liveness monitoring

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use cucumber::{given, then, when};

use camview::liveness::LivenessMonitor;
use camview::scheduler::ManualScheduler;

use crate::world::{CamviewWorld, FakeDevice};

async fn wait_for_checks(monitor: &LivenessMonitor, expected: u64) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while monitor.checks_published() < expected {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("health status not published in time");
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

fn record_stamp(world: &mut CamviewWorld) {
    let monitor = world.monitor.as_ref().expect("monitor not set");
    if let Some(stamp) = monitor.status().last_checked_at {
        world.stamps.push(stamp);
    }
}

#[given("a camera device")]
fn camera_device(world: &mut CamviewWorld) {
    world.device = Some(Arc::new(FakeDevice::default()));
}

#[given(expr = "a liveness monitor with a {int} ms period")]
fn liveness_monitor(world: &mut CamviewWorld, period_ms: u64) {
    let device = world.device.clone().expect("device not set");
    let scheduler = ManualScheduler::new();
    let period = Duration::from_millis(period_ms);
    world.monitor = Some(LivenessMonitor::new(
        device,
        Arc::new(scheduler.clone()),
        period,
        period,
    ));
    world.scheduler = Some(scheduler);
}

#[given(expr = "the health endpoint fails {int} times with status {int}")]
fn health_fails(world: &mut CamviewWorld, times: usize, status: u16) {
    let device = world.device.as_ref().expect("device not set");
    device.health.lock().unwrap().extend(std::iter::repeat(status).take(times));
}

#[given("the device holds every probe")]
fn device_holds(world: &mut CamviewWorld) {
    let device = world.device.as_ref().expect("device not set");
    device.hold.store(true, Ordering::SeqCst);
}

#[when(expr = "the monitor starts on {string}")]
async fn monitor_starts(world: &mut CamviewWorld, base: String) {
    let holding = world.device.as_ref().expect("device not set").is_holding();
    let monitor = world.monitor.as_ref().expect("monitor not set");
    let before = monitor.checks_published();

    monitor.start(&base);
    if holding {
        settle().await;
    } else {
        wait_for_checks(monitor, before + 1).await;
        record_stamp(world);
    }
}

#[when(expr = "{int} period(s) elapse(s)")]
async fn periods_elapse(world: &mut CamviewWorld, periods: u32) {
    let holding = world.device.as_ref().expect("device not set").is_holding();
    for _ in 0..periods {
        let monitor = world.monitor.as_ref().expect("monitor not set");
        let scheduler = world.scheduler.as_ref().expect("scheduler not set");
        let before = monitor.checks_published();

        scheduler.advance(monitor.period());
        if holding || !monitor.is_running() {
            settle().await;
        } else {
            wait_for_checks(monitor, before + 1).await;
            record_stamp(world);
        }
    }
}

#[when("the monitor is stopped")]
fn monitor_stopped(world: &mut CamviewWorld) {
    world.monitor.as_ref().expect("monitor not set").stop();
}

#[when("the held probes are released")]
async fn probes_released(world: &mut CamviewWorld) {
    let device = world.device.as_ref().expect("device not set");
    device.hold.store(false, Ordering::SeqCst);
    device.release.notify_waiters();
    settle().await;
}

#[then(expr = "{int} health status(es) should have been published")]
async fn statuses_published(world: &mut CamviewWorld, expected: u64) {
    let monitor = world.monitor.as_ref().expect("monitor not set");
    if expected > 0 {
        wait_for_checks(monitor, expected).await;
    }
    settle().await;
    assert_eq!(monitor.checks_published(), expected);
}

#[then(expr = "check {int} should report the device {word}")]
async fn check_reports(world: &mut CamviewWorld, check: u64, state: String) {
    let monitor = world.monitor.as_ref().expect("monitor not set");
    wait_for_checks(monitor, check).await;
    assert_eq!(monitor.checks_published(), check);

    let expected_ok = match state.as_str() {
        "up" => true,
        "down" => false,
        other => panic!("Unknown device state: {}", other),
    };
    assert_eq!(monitor.status().ok, expected_ok);
}

#[then("the check timestamps should be strictly increasing")]
fn stamps_increasing(world: &mut CamviewWorld) {
    assert!(world.stamps.len() > 1, "not enough checks recorded");
    for pair in world.stamps.windows(2) {
        assert!(pair[1] > pair[0], "{} is not after {}", pair[1], pair[0]);
    }
}

#[then("no health status should have been published")]
fn nothing_published(world: &mut CamviewWorld) {
    let monitor = world.monitor.as_ref().expect("monitor not set");
    assert_eq!(monitor.checks_published(), 0);
    assert!(monitor.status().last_checked_at.is_none());
}

#[then(expr = "exactly {int} probe timer(s) should be active")]
fn timers_active(world: &mut CamviewWorld, expected: usize) {
    let scheduler = world.scheduler.as_ref().expect("scheduler not set");
    assert_eq!(scheduler.active_count(), expected);
}

#[then(expr = "the last probe should target {string}")]
fn last_probe_target(world: &mut CamviewWorld, expected: String) {
    let device = world.device.as_ref().expect("device not set");
    assert_eq!(device.last_request(), Some(expected));
}
