//! Bearer-token extractor for API handlers.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use pladivo_core::auth::guard::{self, GuardError};
use pladivo_core::auth::{Role, TokenClaims};

use super::AppState;
use super::error::AppError;

/// Roles that run the back office: plan editing, fan-out, contracts.
pub const BACK_OFFICE: &[Role] = &[Role::Staff, Role::Manager];
/// Roles that may decide on a plan on the customer's behalf.
pub const CUSTOMER_SIDE: &[Role] = &[Role::Customer, Role::Manager];
/// Manager-only actions: the manager decision and the status override.
pub const MANAGER: &[Role] = &[Role::Manager];

/// The authenticated caller. Rejects the request with 401 when the
/// `Authorization: Bearer` header is missing or invalid.
#[derive(Debug, Clone)]
pub struct Caller(pub TokenClaims);

impl Caller {
    pub fn require(&self, allowed: &[Role]) -> Result<(), AppError> {
        guard::require_role(&self.0, allowed).map_err(AppError::from)
    }

    pub fn subject(&self) -> &str {
        &self.0.subject
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .map(|v| v.to_str().map_err(|_| GuardError::WrongScheme))
            .transpose()?;
        let claims = guard::require_bearer(&state.tokens, header)?;
        Ok(Self(claims))
    }
}
