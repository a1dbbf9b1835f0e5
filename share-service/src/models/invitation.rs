//! Invitation model - one sharing grant per recipient and link.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::resource::ResourceScope;

/// Invitation state codes.
///
/// `Expired` is a read-time state derived from `created_at` and the
/// configured invitation TTL; it is never written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Revoked,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Revoked => "revoked",
            InvitationStatus::Expired => "expired",
        }
    }
}

/// In-flight one-time access code attached to an invitation.
///
/// Single-use: a successful verification clears it in the same mutation
/// that updates the device list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Invitation entity.
///
/// The share token is both the primary key and the bearer credential
/// embedded in share links; rotation creates a new row with a new token
/// rather than mutating this one.
#[derive(Debug, Clone, FromRow)]
pub struct Invitation {
    pub token: String,
    pub project_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub email: String,
    pub status: String,
    pub allowed_devices: Vec<String>,
    pub access_code: Option<String>,
    pub access_code_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Invitation {
    /// Create a pending invitation with a freshly generated token and an
    /// empty device allow-list.
    pub fn new(project_id: String, email: String, scope: ResourceScope) -> Self {
        Self {
            token: generate_token(),
            project_id,
            resource_type: scope.resource_type.as_str().to_string(),
            resource_id: scope.resource_id,
            email,
            status: InvitationStatus::Pending.as_str().to_string(),
            allowed_devices: Vec::new(),
            access_code: None,
            access_code_expires_at: None,
            created_at: Utc::now(),
            revoked_at: None,
        }
    }

    /// Attach an in-flight access code. Overwrites any prior code.
    pub fn with_access_code(mut self, code: AccessCode) -> Self {
        self.access_code = Some(code.code);
        self.access_code_expires_at = Some(code.expires_at);
        self
    }

    /// The in-flight access code, if a verification is pending.
    pub fn access_code(&self) -> Option<AccessCode> {
        match (&self.access_code, self.access_code_expires_at) {
            (Some(code), Some(expires_at)) => Some(AccessCode {
                code: code.clone(),
                expires_at,
            }),
            _ => None,
        }
    }

    /// Effective status with read-time expiry applied.
    pub fn effective_status(&self, now: DateTime<Utc>, ttl: Duration) -> InvitationStatus {
        match self.status.as_str() {
            "revoked" => InvitationStatus::Revoked,
            "accepted" if self.created_at + ttl < now => InvitationStatus::Expired,
            "accepted" => InvitationStatus::Accepted,
            _ if self.created_at + ttl < now => InvitationStatus::Expired,
            _ => InvitationStatus::Pending,
        }
    }

    /// A live invitation still grants access: pending or accepted, and not
    /// past the invitation TTL.
    pub fn is_live(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        matches!(
            self.effective_status(now, ttl),
            InvitationStatus::Pending | InvitationStatus::Accepted
        )
    }

    /// Device Binding Authority predicate: is this device already authorized
    /// to use the token without re-verification?
    pub fn is_bound(&self, device_id: &str) -> bool {
        self.allowed_devices.iter().any(|d| d == device_id)
    }

    /// The sharing scope this invitation covers.
    pub fn scope(&self) -> ResourceScope {
        ResourceScope {
            resource_type: self.resource_type.parse().unwrap_or_default(),
            resource_id: self.resource_id.clone(),
        }
    }
}

/// Generate a 32-hex-character share token from 16 random bytes.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceType;

    fn invitation() -> Invitation {
        Invitation::new(
            "P1".to_string(),
            "a@x.com".to_string(),
            ResourceScope {
                resource_type: ResourceType::Project,
                resource_id: "P1".to_string(),
            },
        )
    }

    #[test]
    fn token_is_32_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fresh_invitation_is_live_and_unbound() {
        let inv = invitation();
        let now = Utc::now();
        assert!(inv.is_live(now, Duration::days(30)));
        assert_eq!(
            inv.effective_status(now, Duration::days(30)),
            InvitationStatus::Pending
        );
        assert!(!inv.is_bound("dev1"));
        assert!(inv.access_code().is_none());
    }

    #[test]
    fn ttl_expiry_is_evaluated_at_read_time() {
        let mut inv = invitation();
        inv.created_at = Utc::now() - Duration::days(31);
        let now = Utc::now();
        assert_eq!(
            inv.effective_status(now, Duration::days(30)),
            InvitationStatus::Expired
        );
        assert!(!inv.is_live(now, Duration::days(30)));
        // The stored status was never rewritten.
        assert_eq!(inv.status, "pending");
    }

    #[test]
    fn revoked_wins_over_expiry() {
        let mut inv = invitation();
        inv.status = InvitationStatus::Revoked.as_str().to_string();
        inv.created_at = Utc::now() - Duration::days(31);
        assert_eq!(
            inv.effective_status(Utc::now(), Duration::days(30)),
            InvitationStatus::Revoked
        );
    }

    #[test]
    fn access_code_expiry_boundary() {
        let now = Utc::now();
        let expired = AccessCode {
            code: "123456".to_string(),
            expires_at: now - Duration::milliseconds(1),
        };
        let valid = AccessCode {
            code: "123456".to_string(),
            expires_at: now + Duration::milliseconds(1),
        };
        assert!(expired.is_expired(now));
        assert!(!valid.is_expired(now));
    }
}
