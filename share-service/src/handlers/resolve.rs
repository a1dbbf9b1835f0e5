//! Access resolution for the client-side guard.
//!
//! Projects a visit (resource + optional token + optional device) into the
//! three facts the guard's transition rules need, without ever exposing the
//! device allow-list or the in-flight code.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;

use crate::dtos::sharing::{ResolveAccessQuery, ResolveAccessResponse};
use crate::error::AppError;
use crate::handlers::invitation::invitation_ttl;
use crate::models::{AccessLevel, ResourceScope, ResourceType};
use crate::AppState;

/// GET /access/resolve
#[tracing::instrument(skip(state, query), fields(project_id = %query.project_id))]
pub async fn resolve_access(
    State(state): State<AppState>,
    Query(query): Query<ResolveAccessQuery>,
) -> Result<Json<ResolveAccessResponse>, AppError> {
    let requested = ResourceScope {
        resource_type: query.resource_type,
        resource_id: query
            .resource_id
            .clone()
            .unwrap_or_else(|| query.project_id.clone()),
    };

    let access_level = lookup_access_level(&state, &query.project_id, &requested).await?;

    let (token_valid, device_bound) = match &query.token {
        None => (false, false),
        Some(token) => {
            let now = Utc::now();
            let ttl = invitation_ttl(&state);
            match state.store.find_by_token(token).await? {
                Some(inv)
                    if inv.is_live(now, ttl)
                        && inv.project_id == query.project_id
                        && inv.scope().covers(&requested) =>
                {
                    let bound = query
                        .device_id
                        .as_deref()
                        .map(|device| inv.is_bound(device))
                        .unwrap_or(false);
                    (true, bound)
                }
                _ => (false, false),
            }
        }
    };

    Ok(Json(ResolveAccessResponse {
        access_level,
        token_valid,
        device_bound,
    }))
}

/// Access level for the requested resource. A file visit with no file-level
/// entry inherits the project's level; a resource nobody ever configured
/// sharing for is open.
async fn lookup_access_level(
    state: &AppState,
    project_id: &str,
    requested: &ResourceScope,
) -> Result<AccessLevel, AppError> {
    if let Some(level) = state.store.resource_access(project_id, requested).await? {
        return Ok(level);
    }
    if requested.resource_type == ResourceType::File {
        if let Some(level) = state
            .store
            .resource_access(project_id, &ResourceScope::project(project_id))
            .await?
        {
            return Ok(level);
        }
    }
    Ok(AccessLevel::Open)
}
