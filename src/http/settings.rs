use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};

use crate::census::forms::{ParticipantForm, PonderationForm, SettingForm};
use crate::census::identity::translated;
use crate::census::{self, CensusError};
use crate::entities::{setting, user};
use crate::models::census::{
    CreateSettingRequest, ParticipantView, PonderationView, ResourceView, SettingDetailView,
    SettingView, VoterView,
};
use crate::resolver;
use crate::state::AppState;

use super::HttpError;
use super::extract::CurrentUser;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_settings).post(create_setting))
        .route(
            "/{setting_id}",
            get(get_setting).put(update_setting).delete(destroy_setting),
        )
        .route(
            "/{setting_id}/ponderations",
            get(list_ponderations).post(create_ponderation),
        )
        .route(
            "/{setting_id}/ponderations/{ponderation_id}",
            delete(destroy_ponderation),
        )
        .route(
            "/{setting_id}/participants",
            get(list_participants).post(create_participant),
        )
        .route(
            "/{setting_id}/participants/{participant_id}",
            delete(destroy_participant),
        )
        .route("/{setting_id}/voters", get(list_voters))
}

/// Settings are only visible to admins of the owning organization.
pub(super) async fn owned_setting(
    state: &AppState,
    admin: &user::Model,
    setting_id: i64,
) -> Result<setting::Model, HttpError> {
    let found = census::find_setting(&*state.database, setting_id).await?;
    if found.organization_id != admin.organization_id {
        return Err(CensusError::SettingNotFound(setting_id).into());
    }
    Ok(found)
}

async fn list_settings(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
) -> Result<Json<Vec<SettingView>>, HttpError> {
    let settings = census::list_settings(&*state.database, admin.organization_id).await?;
    Ok(Json(settings.into_iter().map(SettingView::from).collect()))
}

async fn create_setting(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Json(request): Json<CreateSettingRequest>,
) -> Result<(StatusCode, Json<SettingView>), HttpError> {
    let created = census::create_setting(
        &*state.database,
        admin.organization_id,
        request.setting,
        request.copy_from_setting_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

async fn get_setting(
    Path(setting_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
) -> Result<Json<SettingDetailView>, HttpError> {
    let found = owned_setting(&state, &admin, setting_id).await?;
    let dependents = census::setting_dependents(&*state.database, setting_id).await?;
    let resources = resolver::authorized_resources(&*state.database, &found)
        .await?
        .into_iter()
        .map(|election| ResourceView {
            id: election.id,
            title: translated(&election.title, &state.census.default_locale),
            census_manifest: election.census_manifest,
        })
        .collect();
    Ok(Json(SettingDetailView::new(found, dependents, resources)))
}

async fn update_setting(
    Path(setting_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Json(form): Json<SettingForm>,
) -> Result<Json<SettingView>, HttpError> {
    owned_setting(&state, &admin, setting_id).await?;
    let updated = census::update_setting(&*state.database, setting_id, form).await?;
    Ok(Json(updated.into()))
}

async fn destroy_setting(
    Path(setting_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
) -> Result<StatusCode, HttpError> {
    owned_setting(&state, &admin, setting_id).await?;
    census::destroy_setting(&*state.database, setting_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_ponderations(
    Path(setting_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
) -> Result<Json<Vec<PonderationView>>, HttpError> {
    owned_setting(&state, &admin, setting_id).await?;
    let ponderations = census::list_ponderations(&*state.database, setting_id).await?;
    Ok(Json(ponderations.into_iter().map(PonderationView::from).collect()))
}

async fn create_ponderation(
    Path(setting_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Json(form): Json<PonderationForm>,
) -> Result<(StatusCode, Json<PonderationView>), HttpError> {
    form.check().map_err(HttpError::invalid)?;
    owned_setting(&state, &admin, setting_id).await?;
    let created = census::create_ponderation(&*state.database, setting_id, form).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

async fn destroy_ponderation(
    Path((setting_id, ponderation_id)): Path<(i64, i64)>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
) -> Result<StatusCode, HttpError> {
    owned_setting(&state, &admin, setting_id).await?;
    census::destroy_ponderation(&*state.database, setting_id, ponderation_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_participants(
    Path(setting_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
) -> Result<Json<Vec<ParticipantView>>, HttpError> {
    owned_setting(&state, &admin, setting_id).await?;
    let participants = census::list_participants(&*state.database, setting_id).await?;
    Ok(Json(participants.into_iter().map(ParticipantView::from).collect()))
}

async fn create_participant(
    Path(setting_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Json(form): Json<ParticipantForm>,
) -> Result<(StatusCode, Json<ParticipantView>), HttpError> {
    owned_setting(&state, &admin, setting_id).await?;
    let created =
        census::create_participant(&*state.database, &state.census, setting_id, form).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

async fn destroy_participant(
    Path((setting_id, participant_id)): Path<(i64, i64)>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
) -> Result<StatusCode, HttpError> {
    owned_setting(&state, &admin, setting_id).await?;
    census::destroy_participant(&*state.database, setting_id, participant_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_voters(
    Path(setting_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
) -> Result<Json<Vec<VoterView>>, HttpError> {
    owned_setting(&state, &admin, setting_id).await?;
    let voters = census::eligible_voters(&*state.database, setting_id).await?;
    Ok(Json(voters.into_iter().map(VoterView::from).collect()))
}
