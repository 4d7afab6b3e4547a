//! Request authentication: the `CurrentUser` extractor pulls and verifies the
//! bearer token, so handlers just take `user: CurrentUser` as an argument.

use crate::{auth::tokens, errors::Error, types::UserId, AppState};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: String,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::unauthorized("missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| Error::unauthorized("expected Bearer token"))?;

        let claims = tokens::verify(&state.config.jwt_secret, token)
            .map_err(|_| Error::unauthorized("invalid or expired token"))?;

        Ok(CurrentUser {
            id: claims.sub,
            email: claims.email,
        })
    }
}
