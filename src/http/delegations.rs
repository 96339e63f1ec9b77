use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::delegations::{self, DelegationError};
use crate::models::census::{CreateDelegationRequest, DelegationView};
use crate::state::AppState;

use super::HttpError;
use super::extract::CurrentUser;
use super::settings::owned_setting;

/// Admin routes, nested under `/admin/settings`.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route(
            "/{setting_id}/delegations",
            get(list_delegations).post(create_delegation),
        )
        .route(
            "/{setting_id}/delegations/{delegation_id}",
            delete(delete_delegation),
        )
}

/// Self-service routes, nested under `/settings`.
pub fn router() -> Router<AppState> {
    Router::new().route("/{setting_id}/delegations", post(delegate_own_vote))
}

#[derive(Debug, Deserialize)]
struct SelfDelegationRequest {
    grantee_id: i64,
}

async fn list_delegations(
    Path(setting_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
) -> Result<Json<Vec<DelegationView>>, HttpError> {
    owned_setting(&state, &admin, setting_id).await?;
    let delegations = delegations::list_for_setting(&*state.database, setting_id).await?;
    Ok(Json(delegations.into_iter().map(DelegationView::from).collect()))
}

async fn create_delegation(
    Path(setting_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Json(request): Json<CreateDelegationRequest>,
) -> Result<(StatusCode, Json<DelegationView>), HttpError> {
    owned_setting(&state, &admin, setting_id).await?;
    let created = delegations::create_delegation(
        &*state.database,
        setting_id,
        request.granter_id,
        request.grantee_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

async fn delete_delegation(
    Path((setting_id, delegation_id)): Path<(i64, i64)>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
) -> Result<StatusCode, HttpError> {
    owned_setting(&state, &admin, setting_id).await?;
    let held = delegations::list_for_setting(&*state.database, setting_id).await?;
    if !held.iter().any(|delegation| delegation.id == delegation_id) {
        return Err(DelegationError::NotFound(delegation_id).into());
    }
    delegations::delete_delegation(&*state.database, delegation_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The actor delegates their own vote in the setting.
async fn delegate_own_vote(
    Path(setting_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(request): Json<SelfDelegationRequest>,
) -> Result<(StatusCode, Json<DelegationView>), HttpError> {
    let created = delegations::create_delegation(
        &*state.database,
        setting_id,
        actor.id,
        request.grantee_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}
