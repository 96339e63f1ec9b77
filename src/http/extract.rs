use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use sea_orm::EntityTrait;

use crate::entities::user;
use crate::state::AppState;

use super::HttpError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const BALLOT_SESSION_HEADER: &str = "x-ballot-session";

const MAX_SESSION_TOKEN_LEN: usize = 128;

/// Authenticated actor forwarded by the platform gateway.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub user::Model);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                HttpError::new(StatusCode::UNAUTHORIZED, "missing actor".to_string())
            })?;
        let user_id: i64 = raw.trim().parse().map_err(|_| {
            HttpError::new(StatusCode::UNAUTHORIZED, "malformed actor id".to_string())
        })?;

        let actor = user::Entity::find_by_id(user_id)
            .one(&*state.database)
            .await?
            .filter(|user| user.deleted_at.is_none())
            .ok_or_else(|| HttpError::new(StatusCode::UNAUTHORIZED, "unknown actor".to_string()))?;
        Ok(Self(actor))
    }
}

/// Opaque token naming the caller's ballot session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BallotSessionId(pub String);

impl FromRequestParts<AppState> for BallotSessionId {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(BALLOT_SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|token| !token.is_empty() && token.len() <= MAX_SESSION_TOKEN_LEN)
            .ok_or_else(|| {
                HttpError::new(StatusCode::BAD_REQUEST, "missing ballot session".to_string())
            })?;
        Ok(Self(token.to_string()))
    }
}
