//! Client-side access guard for shared reviews.
//!
//! Embedding clients hand the guard a share token (if the opened link
//! carried one) and the browser profile's device identifier, then drive the
//! state machine: `Checking` resolves into `Allowed`, `Denied` or
//! `VerificationNeeded`, and the verification path (send code, submit code)
//! promotes the session to `Allowed` once a one-time code checks out.
//!
//! Every backend failure during resolution is treated as a denial - the
//! guard never fails open.

mod api;
mod guard;

pub use api::{
    AccessLevel, ApiError, HttpShareApi, ResolvedAccess, ResourceRequest, ResourceType, ShareApi,
};
pub use guard::{AccessGuard, DeniedReason, GuardError, GuardState};

use uuid::Uuid;

/// Opaque, client-generated device identifier.
///
/// Generated once per browser profile / installation and persisted by the
/// embedding client; the server never verifies it beyond membership in an
/// invitation's allow-list. Injected explicitly so tests can pin it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId(String);

impl DeviceId {
    /// Generate a fresh random identifier. Call once, then persist.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
