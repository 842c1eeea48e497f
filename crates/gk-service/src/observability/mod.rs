//! Observability module for Gatekeeper.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;
