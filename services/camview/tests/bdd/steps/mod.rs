//! BDD step definitions for the camera viewer

pub mod endpoint_steps;
pub mod liveness_steps;
pub mod stream_steps;
