//! Shared utilities.

pub mod telemetry;
