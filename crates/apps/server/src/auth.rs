use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use foundation::{Clock, SystemClock};
use http::header::AUTHORIZATION;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::routes::AppState;

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

/// bcrypt hash of a password in modular crypt format; salt and cost are
/// part of the string.
#[derive(Clone, Debug)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(password: &str) -> ApiResult<Self> {
        bcrypt::hash(password, HASH_COST).map(Self).map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            ApiError::Internal
        })
    }

    /// A malformed stored hash never verifies.
    pub fn verify(&self, password: &str) -> bool {
        matches!(bcrypt::verify(password, &self.0), Ok(true))
    }
}

/// Reads `Authorization: Bearer <token>`.
pub fn bearer_token(parts: &Parts) -> Option<Uuid> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .and_then(|t| Uuid::parse_str(t.trim()).ok())
}

/// An authenticated caller; rejects with 401.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthUser(pub Uuid);

/// The caller if a valid token was sent. Bad or expired tokens read as anonymous.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaybeUser(pub Option<Uuid>);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        state
            .repo
            .authenticate(token, SystemClock.now())
            .map(AuthUser)
            .ok_or(ApiError::Unauthorized)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = bearer_token(parts).and_then(|t| state.repo.authenticate(t, SystemClock.now()));
        Ok(MaybeUser(user))
    }
}
