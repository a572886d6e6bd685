//! BDD step definitions for stream recovery

use std::collections::HashSet;

use cucumber::{given, then, when};

use camview::stream::StreamViewer;

use crate::world::CamviewWorld;

fn viewer(world: &CamviewWorld) -> &StreamViewer {
    world.stream.as_ref().expect("stream viewer not set")
}

fn fail_current(world: &mut CamviewWorld) {
    let stream = viewer(world);
    let attempt = stream.current_attempt().expect("viewer not mounted");
    let previous = stream.state().cache_token;
    assert!(stream.on_attach_result(&attempt, false));
    let url = stream.state().url;

    world.previous_token = previous;
    world.failed_attempt = Some(attempt);
    world.references.push(url);
}

#[given(expr = "a stream viewer on {string}")]
fn stream_viewer(world: &mut CamviewWorld, base: String) {
    let stream = StreamViewer::new();
    stream.start(&base);
    world.references.push(stream.state().url);
    world.stream = Some(stream);
}

#[when("the stream fails to load")]
fn stream_fails(world: &mut CamviewWorld) {
    fail_current(world);
}

#[when("the retry is issued")]
fn retry_issued(world: &mut CamviewWorld) {
    let failed = world.failed_attempt.as_ref().expect("no failed attempt");
    let retry = viewer(world).retry(failed.generation);
    world.retry_attempt = retry;
}

#[when("the stream loads successfully")]
fn stream_loads(world: &mut CamviewWorld) {
    let stream = viewer(world);
    let attempt = stream.current_attempt().expect("viewer not mounted");
    assert!(stream.on_attach_result(&attempt, true));
}

#[when(expr = "the stream fails to load {int} times in a row")]
fn stream_fails_repeatedly(world: &mut CamviewWorld, times: usize) {
    for _ in 0..times {
        fail_current(world);
        let failed = world.failed_attempt.as_ref().expect("no failed attempt");
        let retry = viewer(world).retry(failed.generation);
        assert!(retry.is_some(), "retry was not issued");
        world.retry_attempt = retry;
    }
}

#[when(expr = "the base address changes to {string}")]
fn base_changes(world: &mut CamviewWorld, base: String) {
    viewer(world).set_base(&base);
}

#[then("the stream should be failed")]
fn stream_failed(world: &mut CamviewWorld) {
    assert!(viewer(world).state().failed);
}

#[then("the stream should not be failed")]
fn stream_not_failed(world: &mut CamviewWorld) {
    assert!(!viewer(world).state().failed);
}

#[then("the stream reference should carry a new cache token")]
fn new_cache_token(world: &mut CamviewWorld) {
    let token = viewer(world)
        .state()
        .cache_token
        .expect("no cache token assigned");
    if let Some(previous) = world.previous_token {
        assert!(token > previous, "{} is not newer than {}", token, previous);
    }
    let url = viewer(world).state().url;
    assert!(url.ends_with(&format!("?t={}", token)), "{}", url);
}

#[then(expr = "the stream reference should start with {string}")]
fn reference_starts_with(world: &mut CamviewWorld, prefix: String) {
    let url = viewer(world).state().url;
    assert!(url.starts_with(&prefix), "{} does not start with {}", url, prefix);
}

#[then(expr = "the stream reference should be {string}")]
fn reference_is(world: &mut CamviewWorld, expected: String) {
    assert_eq!(viewer(world).state().url, expected);
}

#[then("every reference should have been different")]
fn references_distinct(world: &mut CamviewWorld) {
    let unique: HashSet<&String> = world.references.iter().collect();
    assert_eq!(unique.len(), world.references.len());
}

#[then("the retry should target the current reference")]
fn retry_targets_current(world: &mut CamviewWorld) {
    let retry = world.retry_attempt.as_ref().expect("retry not issued");
    assert_eq!(retry.url, viewer(world).state().url);
}

#[then("the pending retry should be rejected")]
fn retry_rejected(world: &mut CamviewWorld) {
    let failed = world.failed_attempt.as_ref().expect("no failed attempt");
    let stream = viewer(world);
    assert!(stream.retry(failed.generation).is_none());
    assert!(!stream.on_attach_result(failed, false));
}
