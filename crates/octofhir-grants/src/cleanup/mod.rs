//! Expired-grant cleanup.
//!
//! - [`TokenCleanup`] - one sweep: find expired grants in batches and remove them
//! - [`TokenCleanupService`] - background worker running a sweep every interval
//! - [`GrantRemovalNotification`] - optional hook for removed grants

pub mod notification;
pub mod service;
pub mod sweep;

#[cfg(test)]
pub(crate) mod testing;

pub use notification::GrantRemovalNotification;
pub use service::{CleanupStats, TokenCleanupService, WorkerState};
pub use sweep::TokenCleanup;
