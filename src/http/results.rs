use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use tracing::debug;

use crate::census::fixed_now;
use crate::entities::{election, user};
use crate::state::AppState;
use crate::tally::{self, ElectionResults, ResultsMode, TallyError};

use super::HttpError;
use super::extract::CurrentUser;

pub fn router() -> Router<AppState> {
    Router::new().route("/{election_id}/results/sum_of_weights", get(public_sum_of_weights))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route(
            "/elections/{election_id}/results/by_type_and_weight",
            get(by_type_and_weight),
        )
        .route(
            "/elections/{election_id}/results/sum_of_weights",
            get(sum_of_weights),
        )
        .route("/elections/{election_id}/results/totals", get(totals))
        .route(
            "/elections/{election_id}/delegated_votes",
            get(delegated_votes),
        )
}

/// Unpublished elections do not exist for the public.
async fn public_sum_of_weights(
    Path(election_id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<Value>, HttpError> {
    let election = tally::find_election(&*state.database, election_id).await?;
    if election.published_at.is_none() {
        return Err(TallyError::ElectionNotFound(election_id).into());
    }
    cached_results(&state, ResultsMode::PublicSumOfWeights, &election).await
}

async fn by_type_and_weight(
    Path(election_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
) -> Result<Json<Value>, HttpError> {
    let election = owned_election(&state, &admin, election_id).await?;
    cached_results(&state, ResultsMode::ByTypeAndWeight, &election).await
}

async fn sum_of_weights(
    Path(election_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
) -> Result<Json<Value>, HttpError> {
    let election = owned_election(&state, &admin, election_id).await?;
    cached_results(&state, ResultsMode::SumOfWeights, &election).await
}

async fn totals(
    Path(election_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
) -> Result<Json<Value>, HttpError> {
    let election = owned_election(&state, &admin, election_id).await?;
    cached_results(&state, ResultsMode::Totals, &election).await
}

async fn delegated_votes(
    Path(election_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
) -> Result<Json<Value>, HttpError> {
    let election = owned_election(&state, &admin, election_id).await?;
    let entries = tally::delegated_vote_trail(&*state.database, &election).await?;
    let value = serde_json::to_value(entries)
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Ok(Json(value))
}

/// Elections of other organizations answer as missing.
async fn owned_election(
    state: &AppState,
    admin: &user::Model,
    election_id: i64,
) -> Result<election::Model, HttpError> {
    let found = tally::find_election(&*state.database, election_id).await?;
    if found.organization_id != admin.organization_id {
        return Err(TallyError::ElectionNotFound(election_id).into());
    }
    Ok(found)
}

/// Results are polled; a short-lived cache absorbs the polling load.
async fn cached_results(
    state: &AppState,
    mode: ResultsMode,
    election: &election::Model,
) -> Result<Json<Value>, HttpError> {
    let key = (mode, election.id);
    if let Some(value) = state.cache.results.get(&key).await {
        debug!(?mode, election_id = election.id, "Results served from cache");
        return Ok(Json(value));
    }

    let results =
        ElectionResults::for_election(&*state.database, &state.census, election, fixed_now())
            .await?;
    let value = match mode {
        ResultsMode::ByTypeAndWeight => serde_json::to_value(results.by_type_and_weight()),
        ResultsMode::SumOfWeights => serde_json::to_value(results.sum_of_weights(false)),
        ResultsMode::PublicSumOfWeights => serde_json::to_value(results.sum_of_weights(true)),
        ResultsMode::Totals => serde_json::to_value(results.totals()),
    }
    .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    state.cache.results.insert(key, value.clone()).await;
    Ok(Json(value))
}
