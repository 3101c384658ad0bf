//! Bearer-token session boundary.
//!
//! Session issuance and user management live outside this server; requests
//! carry the configured API token in the `Authorization` header, with or
//! without a `Bearer ` prefix. Anything else is rejected before the handler
//! runs.

use super::state::ServerState;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
};
use std::convert::Infallible;
use tracing::debug;

pub const HEADER_SESSION_TOKEN_KEY: &str = "Authorization";

#[derive(Debug)]
pub struct Session {
    pub token: String,
}

pub enum SessionExtractionError {
    AccessDenied,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            SessionExtractionError::AccessDenied => StatusCode::FORBIDDEN.into_response(),
        }
    }
}

fn extract_session_token_from_headers(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(HEADER_SESSION_TOKEN_KEY)?;
    let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
    Some(
        value
            .strip_prefix("Bearer ")
            .map(|s| s.to_string())
            .unwrap_or(value),
    )
}

fn extract_session_from_request_parts(parts: &Parts, ctx: &ServerState) -> Option<Session> {
    let token = match extract_session_token_from_headers(parts) {
        None => {
            debug!("No token in headers.");
            return None;
        }
        Some(x) => x,
    };

    if ctx.config.api_token.is_empty() || token != ctx.config.api_token {
        debug!("Rejecting request with unknown token");
        return None;
    }

    Some(Session { token })
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_session_from_request_parts(parts, ctx)
            .ok_or(SessionExtractionError::AccessDenied)
    }
}

impl OptionalFromRequestParts<ServerState> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(extract_session_from_request_parts(parts, ctx))
    }
}
