//! Domain types for the operational store.

pub mod persisted_grant;

pub use persisted_grant::{PersistedGrant, grant_types};
