//! In-memory Invitation Store used by tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::models::{AccessCode, AccessLevel, Invitation, OutboxEmail, ResourceScope};
use crate::services::store::InvitationStore;

#[derive(Default)]
struct Inner {
    invitations: HashMap<String, Invitation>,
    resources: HashMap<(String, String, String), AccessLevel>,
    outbox: Vec<OutboxEmail>,
}

/// Mutex-guarded map-backed store. Mutations take the lock once, which gives
/// the same per-invitation atomicity the Postgres store gets from
/// single-statement updates.
#[derive(Default)]
pub struct MemoryInvitationStore {
    inner: Mutex<Inner>,
}

impl MemoryInvitationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of queued outbox emails for a recipient, newest last.
    pub fn outbox_for(&self, recipient: &str) -> Vec<OutboxEmail> {
        let inner = self.inner.lock().unwrap();
        inner
            .outbox
            .iter()
            .filter(|e| e.recipient == recipient)
            .cloned()
            .collect()
    }

    /// Direct read of a stored invitation, bypassing liveness filters.
    pub fn get(&self, token: &str) -> Option<Invitation> {
        self.inner.lock().unwrap().invitations.get(token).cloned()
    }
}

fn resource_key(project_id: &str, scope: &ResourceScope) -> (String, String, String) {
    (
        project_id.to_string(),
        scope.resource_type.as_str().to_string(),
        scope.resource_id.clone(),
    )
}

fn code_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[async_trait]
impl InvitationStore for MemoryInvitationStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn upsert_resource_access(
        &self,
        project_id: &str,
        scope: &ResourceScope,
        level: AccessLevel,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        inner.resources.insert(resource_key(project_id, scope), level);
        Ok(())
    }

    async fn resource_access(
        &self,
        project_id: &str,
        scope: &ResourceScope,
    ) -> Result<Option<AccessLevel>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.resources.get(&resource_key(project_id, scope)).copied())
    }

    async fn insert_invitation(
        &self,
        invitation: &Invitation,
        email: &OutboxEmail,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .invitations
            .insert(invitation.token.clone(), invitation.clone());
        inner.outbox.push(email.clone());
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Invitation>, AppError> {
        Ok(self.inner.lock().unwrap().invitations.get(token).cloned())
    }

    async fn live_for_recipient(
        &self,
        project_id: &str,
        email: &str,
        live_after: DateTime<Utc>,
    ) -> Result<Vec<Invitation>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut live: Vec<Invitation> = inner
            .invitations
            .values()
            .filter(|inv| {
                inv.project_id == project_id
                    && inv.email.eq_ignore_ascii_case(email)
                    && matches!(inv.status.as_str(), "pending" | "accepted")
                    && inv.created_at > live_after
            })
            .cloned()
            .collect();
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(live)
    }

    async fn list_by_project(&self, project_id: &str) -> Result<Vec<Invitation>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut all: Vec<Invitation> = inner
            .invitations
            .values()
            .filter(|inv| inv.project_id == project_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn set_access_code(
        &self,
        token: &str,
        code: &AccessCode,
        live_after: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.invitations.get_mut(token) {
            Some(inv)
                if matches!(inv.status.as_str(), "pending" | "accepted")
                    && inv.created_at > live_after =>
            {
                inv.access_code = Some(code.code.clone());
                inv.access_code_expires_at = Some(code.expires_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn consume_access_code(
        &self,
        token: &str,
        code: &str,
        device_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(inv) = inner.invitations.get_mut(token) else {
            return Ok(None);
        };

        if !matches!(inv.status.as_str(), "pending" | "accepted") {
            return Ok(None);
        }
        let matches = match (&inv.access_code, inv.access_code_expires_at) {
            (Some(stored), Some(expires_at)) => code_eq(stored, code) && expires_at >= now,
            _ => false,
        };
        if !matches {
            return Ok(None);
        }

        inv.access_code = None;
        inv.access_code_expires_at = None;
        inv.status = "accepted".to_string();
        if let Some(device) = device_id {
            if !inv.is_bound(device) {
                inv.allowed_devices.push(device.to_string());
            }
        }
        Ok(Some(inv.clone()))
    }

    async fn bind_device(&self, token: &str, device_id: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(inv) = inner.invitations.get_mut(token) {
            if !inv.is_bound(device_id) {
                inv.allowed_devices.push(device_id.to_string());
            }
        }
        Ok(())
    }

    async fn revoke(&self, token: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.invitations.get_mut(token) {
            Some(inv) => {
                if inv.status != "revoked" {
                    inv.status = "revoked".to_string();
                    inv.revoked_at = Some(Utc::now());
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_recent_emails(
        &self,
        recipient: &str,
        window_seconds: i64,
    ) -> Result<i64, AppError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(window_seconds);
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .outbox
            .iter()
            .filter(|e| e.recipient == recipient && e.created_at > cutoff)
            .count() as i64)
    }

    async fn enqueue_email(&self, email: &OutboxEmail) -> Result<(), AppError> {
        self.inner.lock().unwrap().outbox.push(email.clone());
        Ok(())
    }
}
