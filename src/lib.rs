//! Argus server library: HTTP surface, middleware, and runtime wiring.
//!
//! The binary in `main.rs` is a thin CLI shell over [`server::run`]; the
//! pieces are public so integration tests can drive the router directly.

#![forbid(unsafe_code)]

pub mod api;
pub mod middleware;
pub mod server;
