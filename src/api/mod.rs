//! HTTP API
//!
//! Route table (all under bearer auth unless the deployment has zero
//! configured credentials):
//!
//! POST   /chat                 - Create a conversation
//! GET    /chat                 - List conversations
//! GET    /chat/:id             - Conversation snapshot
//! DELETE /chat/:id             - Delete a conversation (409 while running)
//! GET    /chat/:id/events      - Subscribe to the live event stream (SSE)
//! POST   /chat/:id/send        - Start a run
//! POST   /chat/:id/cancel      - Request cancellation (idempotent)
//! POST   /chat/:id/base_dir    - Update the working directory

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::server::AppState;

pub mod chat;
pub mod events;

/// Error response mapped onto HTTP status codes.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// An internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// A bad request (400).
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<argus_core::Error> for ApiError {
    fn from(err: argus_core::Error) -> Self {
        use argus_core::Error;
        let status = match &err {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyRunning { .. } => StatusCode::CONFLICT,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Engine(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({"success": false, "error": self.message})),
        )
            .into_response()
    }
}

/// Assemble the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat::create_chat).get(chat::list_chats))
        .route(
            "/chat/:id",
            get(chat::get_chat).delete(chat::delete_chat),
        )
        .route("/chat/:id/events", get(events::subscribe))
        .route("/chat/:id/send", post(chat::send))
        .route("/chat/:id/cancel", post(chat::cancel))
        .route("/chat/:id/base_dir", post(chat::set_base_dir))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        use argus_core::Error;
        use uuid::Uuid;

        let err = ApiError::from(Error::NotFound(Uuid::nil()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err = ApiError::from(Error::AlreadyRunning {
            conversation_id: Uuid::nil(),
        });
        assert_eq!(err.status, StatusCode::CONFLICT);

        let err = ApiError::from(Error::InvalidInput("bad".into()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = ApiError::from(Error::Internal("oops".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
