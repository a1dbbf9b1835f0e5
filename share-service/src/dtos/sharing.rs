//! Request/response DTOs for the sharing API.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{AccessLevel, Invitation, InvitationStatus, ResourceType};

/// Create one invitation per recipient email.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvitationsRequest {
    #[validate(length(min = 1, message = "Project id is required"))]
    pub project_id: String,

    #[validate(length(min = 1, message = "At least one recipient email is required"))]
    pub emails: Vec<String>,

    pub resource_type: ResourceType,

    /// Defaults to the project id when sharing the whole project.
    pub resource_id: Option<String>,

    /// Whether viewing the shared resource requires the token + OTP pipeline.
    pub is_private: bool,
}

#[derive(Debug, Serialize)]
pub struct CreateInvitationsResponse {
    pub created: usize,
    /// Emails whose invitation could not be written; the rest went through.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResendAccessLinkRequest {
    #[validate(length(min = 1, message = "Project id is required"))]
    pub project_id: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Overrides the configured public origin in the constructed link.
    pub origin: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResendAccessLinkResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendAccessCodeRequest {
    #[validate(length(equal = 32, message = "Invalid share token"))]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SendAccessCodeResponse {
    pub expires_in: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyAccessCodeRequest {
    #[validate(length(min = 1, message = "Project id is required"))]
    pub project_id: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(equal = 6, message = "Access code must be 6 digits"))]
    pub code: String,

    pub device_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyAccessCodeResponse {
    /// The matched invitation's token, the caller's durable credential.
    pub token: String,
}

/// Invitation projection for creator-facing listings. The in-flight access
/// code itself is never exposed, only whether one is pending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvitationView {
    pub token: String,
    pub project_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub email: String,
    pub status: InvitationStatus,
    pub allowed_devices: Vec<String>,
    pub verification_pending: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl InvitationView {
    pub fn from_invitation(inv: &Invitation, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            token: inv.token.clone(),
            project_id: inv.project_id.clone(),
            resource_type: inv.resource_type.clone(),
            resource_id: inv.resource_id.clone(),
            email: inv.email.clone(),
            status: inv.effective_status(now, ttl),
            allowed_devices: inv.allowed_devices.clone(),
            verification_pending: inv.access_code.is_some(),
            created_at: inv.created_at,
            revoked_at: inv.revoked_at,
        }
    }
}

/// Inputs the Access Guard sends when resolving a visit.
#[derive(Debug, Deserialize)]
pub struct ResolveAccessQuery {
    pub project_id: String,
    pub resource_type: ResourceType,
    pub resource_id: Option<String>,
    pub token: Option<String>,
    pub device_id: Option<String>,
}

/// What the guard needs to run its transition rules; the device allow-list
/// itself stays server-side.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveAccessResponse {
    pub access_level: AccessLevel,
    /// True when the supplied token names a live invitation whose scope
    /// covers the requested resource.
    pub token_valid: bool,
    /// True when the supplied device is already on the allow-list.
    pub device_bound: bool,
}
