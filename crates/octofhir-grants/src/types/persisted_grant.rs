//! Persisted grant domain type.
//!
//! A persisted grant is any operational artifact the identity provider has to
//! remember between requests: authorization codes, refresh tokens, reference
//! tokens, user consent, device codes. Grants carry an optional expiration;
//! expired grants are purged by the cleanup worker.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Well-known grant types issued by the identity provider.
pub mod grant_types {
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const REFERENCE_TOKEN: &str = "reference_token";
    pub const USER_CONSENT: &str = "user_consent";
    pub const DEVICE_CODE: &str = "device_code";
}

/// Grant stored in the operational store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedGrant {
    /// Unique key of the grant (usually a hash of the handle given to the client).
    pub key: String,

    /// Kind of grant, see [`grant_types`].
    #[serde(rename = "type")]
    pub grant_type: String,

    /// Subject the grant was issued for (None for client-only grants).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,

    /// Login session that produced the grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Client the grant was issued to.
    pub client_id: String,

    /// Free-form description supplied at authorization time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// When this grant was created.
    #[serde(with = "time::serde::rfc3339")]
    pub creation_time: OffsetDateTime,

    /// When this grant expires (None = no expiration).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub expiration: Option<OffsetDateTime>,

    /// When this grant was consumed (one-time grants).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub consumed_time: Option<OffsetDateTime>,

    /// Serialized grant payload.
    pub data: String,
}

impl PersistedGrant {
    /// Creates a grant with the mandatory fields set and no expiration.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        grant_type: impl Into<String>,
        client_id: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            grant_type: grant_type.into(),
            subject_id: None,
            session_id: None,
            client_id: client_id.into(),
            description: None,
            creation_time: OffsetDateTime::now_utc(),
            expiration: None,
            consumed_time: None,
            data: data.into(),
        }
    }

    /// Sets the expiration instant.
    #[must_use]
    pub fn expiring_at(mut self, expiration: OffsetDateTime) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn for_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    /// Returns `true` if the grant has expired as of `now`.
    ///
    /// A grant whose expiration equals `now` counts as expired.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expiration.is_some_and(|exp| exp <= now)
    }

    /// Returns `true` if the grant has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Returns `true` if this one-time grant has been used.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed_time.is_some()
    }
}
