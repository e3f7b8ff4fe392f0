//! Host process for the OctoFHIR expired-grant cleanup worker.
//!
//! Loads configuration, connects to PostgreSQL, and runs
//! [`TokenCleanupService`](octofhir_grants::TokenCleanupService) until the
//! process receives Ctrl-C or SIGTERM.

pub mod config;
pub mod host;
pub mod observability;

pub use host::{GrantsHost, run_until, shutdown_signal};
