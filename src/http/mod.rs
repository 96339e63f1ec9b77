use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderName};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use sea_orm::DbErr;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::authorization::AuthorizationStatus;
use crate::ballot::BallotError;
use crate::census::CensusError;
use crate::delegations::DelegationError;
use crate::error::FieldErrors;
use crate::state::AppState;
use crate::tally::TallyError;

mod ballots;
mod delegations;
mod extract;
mod results;
mod settings;

pub use extract::{BALLOT_SESSION_HEADER, USER_ID_HEADER};

pub fn router(state: AppState) -> Router {
    assert!(
        state.start_time.elapsed() < Duration::from_secs(86_400),
        "Application uptime exceeds 24 hours before router creation"
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            ACCEPT,
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(BALLOT_SESSION_HEADER),
        ])
        .max_age(Duration::from_secs(3600));

    let admin_router = Router::new()
        .nest(
            "/settings",
            settings::router().merge(delegations::admin_router()),
        )
        .merge(results::admin_router());

    Router::new()
        .route("/health", get(health_live))
        .route("/health/ready", get(health_ready))
        .nest("/elections", ballots::router().merge(results::router()))
        .nest("/settings", delegations::router())
        .nest("/admin", admin_router)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_live(State(state): State<AppState>) -> Result<Json<HealthResponse>, HttpError> {
    let uptime = state.start_time.elapsed().as_secs();
    assert!(
        uptime <= 31_536_000,
        "Uptime exceeds one year without restart"
    );
    let response = HealthResponse {
        status: "live",
        uptime_seconds: uptime,
    };
    Ok(Json(response))
}

async fn health_ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>, HttpError> {
    state
        .database
        .ping()
        .await
        .map_err(|err| HttpError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()))?;

    let response = ReadyResponse {
        status: "ready",
        cache_entries: CacheSummary {
            results: state.cache.results.entry_count(),
            ballot_sessions: state.sessions.entry_count(),
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    cache_entries: CacheSummary,
}

#[derive(Debug, Serialize)]
struct CacheSummary {
    results: u64,
    ballot_sessions: u64,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    fields: Option<FieldErrors>,
    authorization: Option<AuthorizationStatus>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: String) -> Self {
        assert!(status != StatusCode::OK, "Error status cannot be 200");
        assert!(!message.is_empty(), "Error message cannot be empty");
        Self {
            status,
            message,
            fields: None,
            authorization: None,
        }
    }

    pub fn not_found(message: String) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn invalid(fields: FieldErrors) -> Self {
        Self {
            fields: Some(fields.clone()),
            ..Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Validation failed: {fields}"),
            )
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("HTTP error: {}", self.message);
        } else {
            info!("HTTP error: {}", self.message);
        }
        let body = Json(ErrorBody {
            error: self.message,
            fields: self.fields,
            authorization: self.authorization,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<FieldErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization: Option<AuthorizationStatus>,
}

impl From<DbErr> for HttpError {
    fn from(err: DbErr) -> Self {
        HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl From<CensusError> for HttpError {
    fn from(err: CensusError) -> Self {
        match err {
            CensusError::Invalid(fields) => HttpError::invalid(fields),
            CensusError::SettingNotFound(_)
            | CensusError::PonderationNotFound(_)
            | CensusError::ParticipantNotFound(_) => HttpError::not_found(err.to_string()),
            CensusError::SettingInUse { .. } | CensusError::PonderationInUse { .. } => {
                HttpError::new(StatusCode::CONFLICT, err.to_string())
            }
            CensusError::Database(db) => db.into(),
        }
    }
}

impl From<DelegationError> for HttpError {
    fn from(err: DelegationError) -> Self {
        if let Some(field) = err.field() {
            return HttpError {
                fields: Some(FieldErrors::single(field, err.code())),
                ..HttpError::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            };
        }
        match err {
            DelegationError::GranteeAlreadyVoted => {
                HttpError::new(StatusCode::CONFLICT, err.to_string())
            }
            DelegationError::SettingNotFound(_) | DelegationError::NotFound(_) => {
                HttpError::not_found(err.to_string())
            }
            DelegationError::Database(db) => db.into(),
            other => HttpError::new(StatusCode::UNPROCESSABLE_ENTITY, other.to_string()),
        }
    }
}

impl From<BallotError> for HttpError {
    fn from(err: BallotError) -> Self {
        match err {
            BallotError::ElectionNotFound(_) => HttpError::not_found(err.to_string()),
            BallotError::QuestionNotFound(_) => {
                HttpError::invalid(FieldErrors::single("question_id", "invalid"))
            }
            BallotError::InvalidOption { .. } => {
                HttpError::invalid(FieldErrors::single("response_option_id", "invalid"))
            }
            BallotError::NothingToSubmit => {
                HttpError::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            BallotError::ElectionClosed => HttpError::new(StatusCode::CONFLICT, err.to_string()),
            BallotError::NotAuthorized(status) => HttpError {
                authorization: Some(status),
                ..HttpError::new(
                    StatusCode::FORBIDDEN,
                    "actor is not authorized to vote".to_string(),
                )
            },
            BallotError::Database(db) => db.into(),
        }
    }
}

impl From<TallyError> for HttpError {
    fn from(err: TallyError) -> Self {
        match err {
            TallyError::ElectionNotFound(_) => HttpError::not_found(err.to_string()),
            TallyError::Database(db) => db.into(),
        }
    }
}
