//! BDD step definitions for endpoint composition

use cucumber::{given, then};

use camview::endpoints::{health_url, stream_url};

use crate::world::CamviewWorld;

#[given(expr = "the base address {string}")]
fn base_address(world: &mut CamviewWorld, base: String) {
    world.base = Some(base);
}

#[then(expr = "the health URL should be {string}")]
fn health_url_should_be(world: &mut CamviewWorld, expected: String) {
    let base = world.base.as_ref().expect("base not set");
    assert_eq!(health_url(base), expected);
}

#[then(expr = "the stream URL should be {string}")]
fn stream_url_should_be(world: &mut CamviewWorld, expected: String) {
    let base = world.base.as_ref().expect("base not set");
    assert_eq!(stream_url(base), expected);
}
