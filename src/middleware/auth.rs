//! Authentication middleware for Axum
//!
//! Extracts the bearer credential from requests and validates it against the
//! [`TokenStore`]. Provides the `RequireAuth` extractor for handlers. When
//! the deployment has zero configured credentials the store is disabled and
//! every request passes.

use argus_core::auth::{AuthError, TokenStore};
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

/// JSON error response for auth failures
#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    success: bool,
    error: String,
}

/// Auth rejection type
pub struct AuthRejection {
    status: StatusCode,
    body: AuthErrorResponse,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<AuthError> for AuthRejection {
    fn from(err: AuthError) -> Self {
        let message = match &err {
            AuthError::MissingCredentials => {
                "Authentication required. Provide Authorization: Bearer <token> or ?token=."
            }
            AuthError::InvalidCredentials => "Invalid bearer token",
        };
        AuthRejection {
            status: StatusCode::UNAUTHORIZED,
            body: AuthErrorResponse {
                success: false,
                error: message.to_string(),
            },
        }
    }
}

/// Axum extractor that requires authentication.
///
/// Extracts the token from:
/// 1. `Authorization: Bearer <token>` header
/// 2. `?token=<token>` query parameter (EventSource clients cannot set
///    headers)
///
/// Passes every request through unchanged when the token store is disabled.
pub struct RequireAuth;

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let store = parts
            .extensions
            .get::<Arc<TokenStore>>()
            .ok_or_else(|| AuthRejection {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: AuthErrorResponse {
                    success: false,
                    error: "TokenStore not configured".to_string(),
                },
            })?;

        // zero configured credentials: authentication is bypassed entirely
        if !store.is_enabled() {
            return Ok(RequireAuth);
        }

        let token = extract_token(parts)?;
        store.validate(&token)?;
        Ok(RequireAuth)
    }
}

/// Extract the credential from request headers or query params
fn extract_token(parts: &Parts) -> std::result::Result<String, AuthError> {
    if let Some(auth_header) = parts.headers.get("authorization") {
        if let Ok(value) = auth_header.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Ok(token.trim().to_string());
            }
        }
    }

    if let Some(query) = parts.uri.query() {
        for param in query.split('&') {
            if let Some(token) = param.strip_prefix("token=") {
                return Ok(token.to_string());
            }
        }
    }

    Err(AuthError::MissingCredentials)
}
