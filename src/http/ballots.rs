use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::authorization::{self, AuthorizationStatus};
use crate::ballot::session::BallotSession;
use crate::ballot::{self, EffectiveVoter};
use crate::census::fixed_now;
use crate::census::identity::translated;
use crate::delegations;
use crate::entities::{election, user};
use crate::models::ballots::{
    AnswerRequest, BallotStateView, DelegationQuery, PendingQuestionView, RecordedVoteView,
    SettingDelegationsView, SubmittedBallotView, VotedView,
};
use crate::models::census::DelegationView;
use crate::resolver::GovernedResource;
use crate::state::AppState;

use super::HttpError;
use super::extract::{BallotSessionId, CurrentUser};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{election_id}/authorization", get(authorization_status))
        .route("/{election_id}/delegations", get(held_delegations))
        .route("/{election_id}/voted", get(voted))
        .route("/{election_id}/ballot", get(show_ballot).post(begin_ballot))
        .route("/{election_id}/ballot/answers", post(buffer_answer))
        .route("/{election_id}/ballot/submit", post(submit_ballot))
}

async fn authorization_status(
    Path(election_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<AuthorizationStatus>, HttpError> {
    let election = ballot::find_election(&*state.database, election_id).await?;
    let status =
        authorization::authorize(&*state.database, &state.census, &actor, &election, fixed_now())
            .await?;
    Ok(Json(status))
}

async fn held_delegations(
    Path(election_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<Vec<SettingDelegationsView>>, HttpError> {
    let election = ballot::find_election(&*state.database, election_id).await?;
    let grouped = delegations::grouped_for(
        &*state.database,
        &GovernedResource::election(&election),
        actor.id,
    )
    .await?;
    let views = grouped
        .into_iter()
        .filter(|(_, held)| !held.is_empty())
        .map(|(setting, held)| SettingDelegationsView {
            setting_id: setting.id,
            title: translated(&setting.title, &state.census.default_locale),
            delegations: held.into_iter().map(DelegationView::from).collect(),
        })
        .collect();
    Ok(Json(views))
}

async fn voted(
    Path(election_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<VotedView>, HttpError> {
    let voted = ballot::participant_voted(
        &*state.database,
        &state.census.user_global_id_prefix,
        election_id,
        actor.id,
    )
    .await?;
    Ok(Json(VotedView { election_id, voted }))
}

/// Starts a fresh ballot flow; any earlier delegation selection is forgotten.
async fn begin_ballot(
    Path(election_id): Path<i64>,
    Query(query): Query<DelegationQuery>,
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    BallotSessionId(token): BallotSessionId,
) -> Result<Json<BallotStateView>, HttpError> {
    let election = ballot::find_election(&*state.database, election_id).await?;
    let mut snapshot = state.sessions.load(&token).await;
    snapshot.begin();
    let voter = resolve_voter(&state, &actor, &election, &mut snapshot, query.delegation).await?;
    let delegation_id = voter.delegation_id();
    let session = state
        .sessions
        .update(&token, |session| {
            session.begin();
            session.remember_delegation(delegation_id);
        })
        .await;
    Ok(Json(state_view(&state, election_id, &voter, &session).await?))
}

async fn show_ballot(
    Path(election_id): Path<i64>,
    Query(query): Query<DelegationQuery>,
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    BallotSessionId(token): BallotSessionId,
) -> Result<Json<BallotStateView>, HttpError> {
    let election = ballot::find_election(&*state.database, election_id).await?;
    let mut snapshot = state.sessions.load(&token).await;
    let voter = resolve_voter(&state, &actor, &election, &mut snapshot, query.delegation).await?;
    let delegation_id = voter.delegation_id();
    let session = state
        .sessions
        .update(&token, |session| session.remember_delegation(delegation_id))
        .await;
    Ok(Json(state_view(&state, election_id, &voter, &session).await?))
}

async fn buffer_answer(
    Path(election_id): Path<i64>,
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    BallotSessionId(token): BallotSessionId,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<BallotStateView>, HttpError> {
    let election = ballot::find_election(&*state.database, election_id).await?;
    ballot::validate_answer(
        &*state.database,
        election_id,
        request.question_id,
        request.response_option_id,
    )
    .await?;

    let mut snapshot = state.sessions.load(&token).await;
    let voter = resolve_voter(&state, &actor, &election, &mut snapshot, request.delegation).await?;
    let delegation_id = voter.delegation_id();
    let voter_uid = voter.voter_uid.clone();
    let session = state
        .sessions
        .update(&token, |session| {
            session.remember_delegation(delegation_id);
            session.buffer_answer(
                election_id,
                &voter_uid,
                request.question_id,
                request.response_option_id,
            );
        })
        .await;
    Ok(Json(state_view(&state, election_id, &voter, &session).await?))
}

async fn submit_ballot(
    Path(election_id): Path<i64>,
    Query(query): Query<DelegationQuery>,
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    BallotSessionId(token): BallotSessionId,
) -> Result<Json<SubmittedBallotView>, HttpError> {
    let now = fixed_now();
    let election = ballot::find_election(&*state.database, election_id).await?;
    ballot::ensure_can_vote(&*state.database, &state.census, &actor, &election, now).await?;

    let mut snapshot = state.sessions.load(&token).await;
    let voter = resolve_voter(&state, &actor, &election, &mut snapshot, query.delegation).await?;
    let answers = snapshot.answers(election_id, &voter.voter_uid);
    let recorded =
        ballot::record_ballot(&*state.database, election_id, &voter, actor.id, &answers, now)
            .await?;

    let delegation_id = voter.delegation_id();
    let voter_uid = voter.voter_uid.clone();
    state
        .sessions
        .update(&token, |session| {
            session.remember_delegation(delegation_id);
            session.discard_answers(election_id, &voter_uid, &answers);
        })
        .await;
    state.cache.invalidate_election(election_id).await;

    Ok(Json(SubmittedBallotView {
        election_id,
        voter_uid: voter.voter_uid.clone(),
        delegation_id,
        votes: recorded
            .into_iter()
            .map(|vote| RecordedVoteView {
                id: vote.id,
                question_id: vote.question_id,
                response_option_id: vote.response_option_id,
            })
            .collect(),
    }))
}

async fn resolve_voter(
    state: &AppState,
    actor: &user::Model,
    election: &election::Model,
    session: &mut BallotSession,
    requested_delegation_id: Option<i64>,
) -> Result<EffectiveVoter, HttpError> {
    let voter = ballot::effective_voter(
        &*state.database,
        &state.census.user_global_id_prefix,
        actor.id,
        election,
        session,
        requested_delegation_id,
    )
    .await?;
    Ok(voter)
}

async fn state_view(
    state: &AppState,
    election_id: i64,
    voter: &EffectiveVoter,
    session: &BallotSession,
) -> Result<BallotStateView, HttpError> {
    let pending =
        ballot::pending_questions(&*state.database, election_id, session, &voter.voter_uid).await?;
    Ok(BallotStateView {
        election_id,
        voter_uid: voter.voter_uid.clone(),
        delegation_id: voter.delegation_id(),
        answers: session.answers(election_id, &voter.voter_uid),
        pending_questions: pending
            .into_iter()
            .map(|question| PendingQuestionView {
                id: question.id,
                body: translated(&question.body, &state.census.default_locale),
            })
            .collect(),
    })
}
