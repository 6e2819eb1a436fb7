//! Helpers for the `sipay` binary.
//!
//! - [`telemetry`] - `tracing` subscriber setup

pub mod telemetry;

pub use telemetry::*;
