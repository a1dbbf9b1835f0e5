//! One-time access-code handlers.
//!
//! Issues and verifies the short-lived numeric codes that authorize binding
//! a new device to an existing invitation.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{Duration, Utc};
use rand::Rng;
use subtle::ConstantTimeEq;

use crate::dtos::sharing::{
    SendAccessCodeRequest, SendAccessCodeResponse, VerifyAccessCodeRequest,
    VerifyAccessCodeResponse,
};
use crate::error::AppError;
use crate::handlers::invitation::invitation_ttl;
use crate::models::AccessCode;
use crate::utils::ValidatedJson;
use crate::AppState;

// ============================================================================
// Handlers
// ============================================================================

/// Issue a fresh access code onto the invitation named by the share token,
/// overwriting any prior in-flight code, and queue the code email.
///
/// POST /access-codes/send
#[tracing::instrument(skip_all)]
pub async fn send_access_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SendAccessCodeRequest>,
) -> Result<(StatusCode, Json<SendAccessCodeResponse>), AppError> {
    let response = send_access_code_impl(&state, req).await?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn send_access_code_impl(
    state: &AppState,
    req: SendAccessCodeRequest,
) -> Result<SendAccessCodeResponse, AppError> {
    let now = Utc::now();
    let live_after = now - invitation_ttl(state);

    let invitation = state
        .store
        .find_by_token(&req.token)
        .await?
        .filter(|inv| inv.is_live(now, invitation_ttl(state)))
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("This sharing link is no longer active"))
        })?;

    // Cap issuance per recipient so a leaked link cannot flood an inbox.
    let limits = &state.config.access_code;
    let recent = state
        .store
        .count_recent_emails(&invitation.email, limits.send_window_seconds)
        .await?;
    if recent >= limits.send_limit {
        return Err(AppError::TooManyRequests(
            "Too many code requests. Please try again later.".to_string(),
            Some(limits.send_window_seconds as u64),
        ));
    }

    let code = AccessCode {
        code: generate_access_code(),
        expires_at: now + Duration::minutes(limits.expiry_minutes),
    };

    let updated = state
        .store
        .set_access_code(&req.token, &code, live_after)
        .await?;
    if !updated {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "This sharing link is no longer active"
        )));
    }

    let link = super::invitation::share_url(&state.config.share.public_origin, &invitation);
    let email = super::invitation::access_code_email(&invitation.email, &code.code, &link);
    state.store.enqueue_email(&email).await?;

    // Never log the code itself - it is a live credential.
    tracing::info!(email = %invitation.email, "Access code issued");

    Ok(SendAccessCodeResponse {
        expires_in: limits.expiry_minutes * 60,
    })
}

/// Verify a one-time code and bind the presenting device.
///
/// POST /access-codes/verify
///
/// The clear-code-and-bind-device step is one conditional store update, so
/// two concurrent verifications with the same code cannot both succeed.
#[tracing::instrument(skip_all, fields(project_id = %req.project_id))]
pub async fn verify_access_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<VerifyAccessCodeRequest>,
) -> Result<Json<VerifyAccessCodeResponse>, AppError> {
    let response = verify_access_code_impl(&state, req).await?;
    Ok(Json(response))
}

pub async fn verify_access_code_impl(
    state: &AppState,
    req: VerifyAccessCodeRequest,
) -> Result<VerifyAccessCodeResponse, AppError> {
    let now = Utc::now();
    let live_after = now - invitation_ttl(state);

    let live = state
        .store
        .live_for_recipient(&req.project_id, &req.email, live_after)
        .await?;

    // First live invitation whose in-flight code matches. With a 900,000
    // value code space two invitations can coincidentally share a code;
    // first match wins. Wrong code and no invitation are deliberately
    // indistinguishable to the caller.
    let matched = live.into_iter().find(|inv| {
        inv.access_code
            .as_deref()
            .map(|stored| code_eq(stored, &req.code))
            .unwrap_or(false)
    });

    let invitation = matched.ok_or_else(|| {
        AppError::InvalidArgument(anyhow::anyhow!("Invalid access code"))
    })?;

    if let Some(code) = invitation.access_code() {
        if code.is_expired(now) {
            return Err(AppError::FailedPrecondition(anyhow::anyhow!(
                "This access code has expired. Please request a new one."
            )));
        }
    }

    let consumed = state
        .store
        .consume_access_code(&invitation.token, &req.code, req.device_id.as_deref(), now)
        .await?;

    // A concurrent verification spent the code between our read and the
    // conditional update; to this caller the code no longer exists.
    let invitation = consumed.ok_or_else(|| {
        AppError::InvalidArgument(anyhow::anyhow!("Invalid access code"))
    })?;

    tracing::info!(
        email = %invitation.email,
        device_bound = req.device_id.is_some(),
        "Access code verified"
    );

    Ok(VerifyAccessCodeResponse {
        token: invitation.token,
    })
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Generate a uniformly random 6-digit decimal code.
pub(crate) fn generate_access_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Constant-time code comparison.
fn code_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_codes_are_six_digits_in_range() {
        for _ in 0..100 {
            let code = generate_access_code();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().expect("numeric");
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[test]
    fn code_comparison_matches_exactly() {
        assert!(code_eq("123456", "123456"));
        assert!(!code_eq("123456", "123457"));
        assert!(!code_eq("123456", "12345"));
    }
}
