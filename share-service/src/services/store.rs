//! Invitation Store - the single source of truth for sharing grants.
//!
//! Both the creator-facing lifecycle handlers and the reviewer-facing
//! access-code handlers write here; every mutation is scoped to one
//! invitation row. The security-critical consume-and-bind path is a single
//! guarded UPDATE so concurrent verifications cannot both spend one code.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;

use crate::error::AppError;
use crate::models::{AccessCode, AccessLevel, Invitation, OutboxEmail, ResourceScope};

/// Persistence operations for invitations, shared-resource access levels and
/// the notification outbox.
#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    /// Record (or update) the access level covering a shared resource.
    async fn upsert_resource_access(
        &self,
        project_id: &str,
        scope: &ResourceScope,
        level: AccessLevel,
    ) -> Result<(), AppError>;

    /// Access level for a resource, if sharing was ever configured for it.
    async fn resource_access(
        &self,
        project_id: &str,
        scope: &ResourceScope,
    ) -> Result<Option<AccessLevel>, AppError>;

    /// Insert one invitation together with its notification email, atomically.
    async fn insert_invitation(
        &self,
        invitation: &Invitation,
        email: &OutboxEmail,
    ) -> Result<(), AppError>;

    async fn find_by_token(&self, token: &str) -> Result<Option<Invitation>, AppError>;

    /// Live (pending or accepted, created after `live_after`) invitations for
    /// a recipient within a project, most recent first.
    async fn live_for_recipient(
        &self,
        project_id: &str,
        email: &str,
        live_after: DateTime<Utc>,
    ) -> Result<Vec<Invitation>, AppError>;

    async fn list_by_project(&self, project_id: &str) -> Result<Vec<Invitation>, AppError>;

    /// Attach an in-flight access code to a live invitation, overwriting any
    /// prior one. Returns false when the token names no live invitation.
    async fn set_access_code(
        &self,
        token: &str,
        code: &AccessCode,
        live_after: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// The atomic read-modify-write at the heart of verification: clear the
    /// code, bind the device and mark the grant accepted in one conditional
    /// update. Returns the updated invitation only if the stored code equals
    /// `code` and has not expired at `now`; a concurrent verification that
    /// already consumed the code makes this return `None`.
    async fn consume_access_code(
        &self,
        token: &str,
        code: &str,
        device_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, AppError>;

    /// Idempotent device-binding mutator: adding an already-present device
    /// identifier is a no-op.
    async fn bind_device(&self, token: &str, device_id: &str) -> Result<(), AppError>;

    /// Revoke an invitation; safe to call repeatedly. Returns false when the
    /// token is unknown.
    async fn revoke(&self, token: &str) -> Result<bool, AppError>;

    /// Outbox emails queued for a recipient within the last `window_seconds`,
    /// used to cap code-issuance frequency.
    async fn count_recent_emails(
        &self,
        recipient: &str,
        window_seconds: i64,
    ) -> Result<i64, AppError>;

    /// Queue a notification email on its own (outside an invitation insert).
    async fn enqueue_email(&self, email: &OutboxEmail) -> Result<(), AppError>;
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgInvitationStore {
    pool: PgPool,
}

impl PgInvitationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl InvitationStore for PgInvitationStore {
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }

    async fn upsert_resource_access(
        &self,
        project_id: &str,
        scope: &ResourceScope,
        level: AccessLevel,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO shared_resources (project_id, resource_type, resource_id, access_level, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (project_id, resource_type, resource_id)
            DO UPDATE SET access_level = EXCLUDED.access_level, updated_at = NOW()
            "#,
        )
        .bind(project_id)
        .bind(scope.resource_type.as_str())
        .bind(&scope.resource_id)
        .bind(level.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn resource_access(
        &self,
        project_id: &str,
        scope: &ResourceScope,
    ) -> Result<Option<AccessLevel>, AppError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT access_level FROM shared_resources
            WHERE project_id = $1 AND resource_type = $2 AND resource_id = $3
            "#,
        )
        .bind(project_id)
        .bind(scope.resource_type.as_str())
        .bind(&scope.resource_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        Ok(row.and_then(|(level,)| level.parse().ok()))
    }

    async fn insert_invitation(
        &self,
        invitation: &Invitation,
        email: &OutboxEmail,
    ) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        sqlx::query(
            r#"
            INSERT INTO invitations (token, project_id, resource_type, resource_id, email, status, allowed_devices, access_code, access_code_expires_at, created_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&invitation.token)
        .bind(&invitation.project_id)
        .bind(&invitation.resource_type)
        .bind(&invitation.resource_id)
        .bind(&invitation.email)
        .bind(&invitation.status)
        .bind(&invitation.allowed_devices)
        .bind(&invitation.access_code)
        .bind(invitation.access_code_expires_at)
        .bind(invitation.created_at)
        .bind(invitation.revoked_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        sqlx::query(
            r#"
            INSERT INTO outbox_emails (email_id, recipient, subject, html, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(email.email_id)
        .bind(&email.recipient)
        .bind(&email.subject)
        .bind(&email.html)
        .bind(email.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Invitation>, AppError> {
        sqlx::query_as::<_, Invitation>("SELECT * FROM invitations WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn live_for_recipient(
        &self,
        project_id: &str,
        email: &str,
        live_after: DateTime<Utc>,
    ) -> Result<Vec<Invitation>, AppError> {
        sqlx::query_as::<_, Invitation>(
            r#"
            SELECT * FROM invitations
            WHERE project_id = $1
              AND LOWER(email) = LOWER($2)
              AND status IN ('pending', 'accepted')
              AND created_at > $3
            ORDER BY created_at DESC
            "#,
        )
        .bind(project_id)
        .bind(email)
        .bind(live_after)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn list_by_project(&self, project_id: &str) -> Result<Vec<Invitation>, AppError> {
        sqlx::query_as::<_, Invitation>(
            "SELECT * FROM invitations WHERE project_id = $1 ORDER BY created_at DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn set_access_code(
        &self,
        token: &str,
        code: &AccessCode,
        live_after: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE invitations
            SET access_code = $2, access_code_expires_at = $3
            WHERE token = $1
              AND status IN ('pending', 'accepted')
              AND created_at > $4
            "#,
        )
        .bind(token)
        .bind(&code.code)
        .bind(code.expires_at)
        .bind(live_after)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn consume_access_code(
        &self,
        token: &str,
        code: &str,
        device_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, AppError> {
        // Single-use guarantee: the WHERE clause only matches while the code
        // is still present and unexpired, and the same statement clears it.
        sqlx::query_as::<_, Invitation>(
            r#"
            UPDATE invitations
            SET access_code = NULL,
                access_code_expires_at = NULL,
                status = 'accepted',
                allowed_devices = CASE
                    WHEN $3::TEXT IS NOT NULL AND NOT ($3 = ANY(allowed_devices))
                        THEN array_append(allowed_devices, $3)
                    ELSE allowed_devices
                END
            WHERE token = $1
              AND access_code = $2
              AND access_code_expires_at >= $4
              AND status IN ('pending', 'accepted')
            RETURNING *
            "#,
        )
        .bind(token)
        .bind(code)
        .bind(device_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn bind_device(&self, token: &str, device_id: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE invitations
            SET allowed_devices = array_append(allowed_devices, $2)
            WHERE token = $1 AND NOT ($2 = ANY(allowed_devices))
            "#,
        )
        .bind(token)
        .bind(device_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn revoke(&self, token: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE invitations SET status = 'revoked', revoked_at = NOW() WHERE token = $1 AND status <> 'revoked'",
        )
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Already revoked still counts as success; only an unknown token is
        // reported back as missing.
        let row: Option<(String,)> =
            sqlx::query_as("SELECT token FROM invitations WHERE token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(row.is_some())
    }

    async fn count_recent_emails(
        &self,
        recipient: &str,
        window_seconds: i64,
    ) -> Result<i64, AppError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM outbox_emails WHERE recipient = $1 AND created_at > NOW() - INTERVAL '1 second' * $2",
        )
        .bind(recipient)
        .bind(window_seconds)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(row.0)
    }

    async fn enqueue_email(&self, email: &OutboxEmail) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO outbox_emails (email_id, recipient, subject, html, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(email.email_id)
        .bind(&email.recipient)
        .bind(&email.subject)
        .bind(&email.html)
        .bind(email.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }
}
