//! Application wiring for the `testwright` binary: configuration, test
//! case loading, the Chromium bridge implementing the engine's browser
//! ports, and orchestrator construction.

pub mod app;
pub mod bridge;
pub mod cases;
pub mod config;
