//! Invitation lifecycle handlers.
//!
//! Implements the creator-facing sharing flow:
//! - Create one invitation per recipient email (batch, best-effort)
//! - Resend access: rotate to a fresh token + access code
//! - Revoke an invitation
//! - List / live-stream a project's invitations

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use chrono::{Duration, Utc};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::dtos::sharing::{
    CreateInvitationsRequest, CreateInvitationsResponse, InvitationView, ResendAccessLinkRequest,
    ResendAccessLinkResponse,
};
use crate::error::AppError;
use crate::handlers::access_code::generate_access_code;
use crate::models::{AccessCode, AccessLevel, Invitation, OutboxEmail, ResourceScope, ResourceType};
use crate::utils::ValidatedJson;
use crate::AppState;

// ============================================================================
// Handlers
// ============================================================================

/// Create invitations for a list of recipients.
///
/// POST /invitations
#[tracing::instrument(
    skip(state, req),
    fields(project_id = %req.project_id, recipients = req.emails.len())
)]
pub async fn create_invitations(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateInvitationsRequest>,
) -> Result<(StatusCode, Json<CreateInvitationsResponse>), AppError> {
    let response = create_invitations_impl(&state, req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn create_invitations_impl(
    state: &AppState,
    req: CreateInvitationsRequest,
) -> Result<CreateInvitationsResponse, AppError> {
    for email in &req.emails {
        if !looks_like_email(email) {
            return Err(AppError::InvalidArgument(anyhow::anyhow!(
                "Invalid recipient email: {email}"
            )));
        }
    }

    let scope = request_scope(&req.project_id, req.resource_type, req.resource_id.clone());

    // The covering resource's access level decides whether the guard will
    // gate visits through the token/OTP pipeline at all.
    let level = if req.is_private {
        AccessLevel::TokenRequired
    } else {
        AccessLevel::Open
    };
    state
        .store
        .upsert_resource_access(&req.project_id, &scope, level)
        .await?;

    // Best-effort batch: one failing recipient must not roll back the rest.
    let mut created = 0;
    let mut failed = Vec::new();
    for email in &req.emails {
        let invitation = Invitation::new(req.project_id.clone(), email.clone(), scope.clone());
        let link = share_url(&state.config.share.public_origin, &invitation);
        let outbox = invite_email(email, &link);

        match state.store.insert_invitation(&invitation, &outbox).await {
            Ok(()) => {
                created += 1;
                tracing::info!(email = %email, token = %invitation.token, "Invitation created");
            }
            Err(e) => {
                tracing::warn!(email = %email, error = %e, "Failed to create invitation");
                failed.push(email.clone());
            }
        }
    }

    Ok(CreateInvitationsResponse { created, failed })
}

/// Re-issue access for a recipient who lost or never received their link.
///
/// POST /invitations/resend
///
/// Rotation, not mutation: the most recent live invitation's scope is cloned
/// into a brand-new token carrying a fresh access code; the old link keeps
/// working until the creator revokes it.
#[tracing::instrument(skip(state, req), fields(project_id = %req.project_id))]
pub async fn resend_access_link(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResendAccessLinkRequest>,
) -> Result<Json<ResendAccessLinkResponse>, AppError> {
    let response = resend_access_link_impl(&state, req).await?;
    Ok(Json(response))
}

pub async fn resend_access_link_impl(
    state: &AppState,
    req: ResendAccessLinkRequest,
) -> Result<ResendAccessLinkResponse, AppError> {
    let now = Utc::now();
    let live_after = now - invitation_ttl(state);

    let existing = state
        .store
        .live_for_recipient(&req.project_id, &req.email, live_after)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "No active invitation found for this email address"
            ))
        })?;

    let code = AccessCode {
        code: generate_access_code(),
        expires_at: now + Duration::minutes(state.config.access_code.expiry_minutes),
    };
    let invitation = Invitation::new(
        existing.project_id.clone(),
        existing.email.clone(),
        existing.scope(),
    )
    .with_access_code(code.clone());

    let origin = req
        .origin
        .as_deref()
        .unwrap_or(&state.config.share.public_origin);
    let link = share_url(origin, &invitation);
    let outbox = access_code_email(&invitation.email, &code.code, &link);

    state.store.insert_invitation(&invitation, &outbox).await?;

    tracing::info!(
        email = %invitation.email,
        token = %invitation.token,
        "Access link resent with fresh code"
    );

    Ok(ResendAccessLinkResponse {
        success: true,
        message: "A new access link and code were sent to the recipient".to_string(),
    })
}

/// Revoke an invitation. Idempotent: revoking twice is a no-op success.
///
/// DELETE /invitations/{token}
#[tracing::instrument(skip_all)]
pub async fn revoke_invitation(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode, AppError> {
    let found = state.store.revoke(&token).await?;
    if !found {
        return Err(AppError::NotFound(anyhow::anyhow!("Invitation not found")));
    }
    tracing::info!(token = %token, "Invitation revoked");
    Ok(StatusCode::NO_CONTENT)
}

/// Point-in-time list of a project's invitations.
///
/// GET /projects/{project_id}/invitations
#[tracing::instrument(skip(state))]
pub async fn list_invitations(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<InvitationView>>, AppError> {
    let now = Utc::now();
    let ttl = invitation_ttl(&state);
    let invitations = state.store.list_by_project(&project_id).await?;
    Ok(Json(
        invitations
            .iter()
            .map(|inv| InvitationView::from_invitation(inv, now, ttl))
            .collect(),
    ))
}

const STREAM_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

/// Live subscription to a project's invitations as server-sent events.
/// Re-emits the full list whenever it changes.
///
/// GET /projects/{project_id}/invitations/stream
pub async fn stream_invitations(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    struct Ctx {
        state: AppState,
        project_id: String,
        last: Option<Vec<InvitationView>>,
    }

    let ctx = Ctx {
        state,
        project_id,
        last: None,
    };

    let stream = futures::stream::unfold(ctx, |mut ctx| async move {
        loop {
            let now = Utc::now();
            let ttl = invitation_ttl(&ctx.state);
            match ctx.state.store.list_by_project(&ctx.project_id).await {
                Ok(invitations) => {
                    let views: Vec<InvitationView> = invitations
                        .iter()
                        .map(|inv| InvitationView::from_invitation(inv, now, ttl))
                        .collect();
                    if ctx.last.as_ref() != Some(&views) {
                        let event = Event::default()
                            .event("invitations")
                            .json_data(&views)
                            .unwrap_or_else(|_| Event::default());
                        ctx.last = Some(views);
                        return Some((Ok::<_, Infallible>(event), ctx));
                    }
                }
                Err(e) => {
                    tracing::warn!(project_id = %ctx.project_id, error = %e, "Invitation stream poll failed");
                }
            }
            tokio::time::sleep(STREAM_POLL_INTERVAL).await;
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ============================================================================
// Helper Functions
// ============================================================================

pub(crate) fn invitation_ttl(state: &AppState) -> Duration {
    Duration::days(state.config.share.invitation_ttl_days)
}

fn request_scope(
    project_id: &str,
    resource_type: ResourceType,
    resource_id: Option<String>,
) -> ResourceScope {
    ResourceScope {
        resource_type,
        resource_id: resource_id.unwrap_or_else(|| project_id.to_string()),
    }
}

/// Construct the reviewer-facing share URL. Project-scope links land on the
/// project review page; file-scope links embed the file id in the path.
pub(crate) fn share_url(origin: &str, invitation: &Invitation) -> String {
    match invitation.scope().resource_type {
        ResourceType::Project => format!(
            "{}/review/{}?token={}",
            origin, invitation.project_id, invitation.token
        ),
        ResourceType::File => format!(
            "{}/review/{}/files/{}?token={}",
            origin, invitation.project_id, invitation.resource_id, invitation.token
        ),
    }
}

fn invite_email(to: &str, link: &str) -> OutboxEmail {
    OutboxEmail::new(
        to.to_string(),
        "You've been invited to review".to_string(),
        format!(
            r#"<html><body style="font-family: Arial, sans-serif;">
<h2>You've been invited to review</h2>
<p>Open the link below to view the shared files and leave your feedback:</p>
<p><a href="{link}">{link}</a></p>
<p>If you weren't expecting this invitation you can ignore this email.</p>
</body></html>"#
        ),
    )
}

pub(crate) fn access_code_email(to: &str, code: &str, link: &str) -> OutboxEmail {
    OutboxEmail::new(
        to.to_string(),
        "Your review access code".to_string(),
        format!(
            r#"<html><body style="font-family: Arial, sans-serif;">
<h2>Your access code</h2>
<p>Enter this code to unlock the shared review on this device:</p>
<p style="font-size: 24px; letter-spacing: 4px;"><strong>{code}</strong></p>
<p>The code expires in 30 minutes. You can reopen the review here:</p>
<p><a href="{link}">{link}</a></p>
</body></html>"#
        ),
    )
}

fn looks_like_email(value: &str) -> bool {
    use validator::ValidateEmail;
    value.validate_email()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_url_embeds_token_and_scope() {
        let project = Invitation::new(
            "P1".to_string(),
            "a@x.com".to_string(),
            ResourceScope::project("P1"),
        );
        let url = share_url("https://review.example.com", &project);
        assert_eq!(
            url,
            format!("https://review.example.com/review/P1?token={}", project.token)
        );

        let file = Invitation::new(
            "P1".to_string(),
            "a@x.com".to_string(),
            ResourceScope {
                resource_type: ResourceType::File,
                resource_id: "F9".to_string(),
            },
        );
        let url = share_url("https://review.example.com", &file);
        assert_eq!(
            url,
            format!("https://review.example.com/review/P1/files/F9?token={}", file.token)
        );
    }
}
