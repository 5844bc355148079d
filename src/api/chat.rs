//! Conversation endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::ApiError;
use crate::middleware::auth::RequireAuth;
use crate::server::AppState;
use argus_core::StartRun;

/// Request to create a conversation.
#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    /// Model the conversation runs against
    pub model_name: Option<String>,
    /// Optional working directory for tool execution
    #[serde(default)]
    pub base_dir: Option<String>,
}

/// Request to start a run.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    /// The user message
    pub message: Option<String>,
    /// Model override for this and subsequent runs
    #[serde(default)]
    pub model_name: Option<String>,
    /// Reasoning-effort hint passed through to the engine
    #[serde(default)]
    pub reasoning_effort: Option<String>,
}

/// Request to update the working directory. `null` clears it.
#[derive(Debug, Deserialize)]
pub struct BaseDirRequest {
    /// New working directory, or `null` to clear
    pub base_dir: Option<String>,
}

/// Create a conversation.
pub async fn create_chat(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Json(request): Json<CreateChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let model_name = request
        .model_name
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("model_name is required"))?;

    let id = state.store.create(model_name, request.base_dir).await?;
    Ok(Json(json!({"id": id})))
}

/// List conversations, newest first.
pub async fn list_chats(
    _auth: RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let summaries = state.store.list().await;
    Ok(Json(json!(summaries)))
}

/// Conversation snapshot, with the live running flag for resync.
pub async fn get_chat(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let conversation = state.store.get(id).await?;
    let running = state.controller.is_running(id);
    let mut snapshot = serde_json::to_value(&conversation)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    snapshot["running"] = json!(running);
    Ok(Json(snapshot))
}

/// Delete a conversation. Rejected with 409 while a run is active.
pub async fn delete_chat(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    // existence first, so unknown ids report 404 rather than 409
    state.store.get(id).await?;
    if state.controller.is_running(id) {
        return Err(argus_core::Error::AlreadyRunning {
            conversation_id: id,
        }
        .into());
    }
    state.store.delete(id).await?;
    state.registry.remove(id);
    Ok(Json(json!({"success": true})))
}

/// Start a run for the conversation.
pub async fn send(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SendRequest>,
) -> Result<Json<Value>, ApiError> {
    let message = request
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("message is required"))?;

    state
        .controller
        .start_run(
            id,
            StartRun {
                message,
                model_override: request.model_name,
                reasoning_effort: request.reasoning_effort,
            },
        )
        .await?;
    Ok(Json(json!({"success": true})))
}

/// Request cancellation of the in-flight run. Idempotent; succeeds even with
/// no active run.
pub async fn cancel(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.controller.cancel(id).await?;
    Ok(Json(json!({"success": true})))
}

/// Update the conversation's working directory.
pub async fn set_base_dir(
    _auth: RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<BaseDirRequest>,
) -> Result<Json<Value>, ApiError> {
    state.store.set_base_dir(id, request.base_dir.clone()).await?;
    Ok(Json(json!({"success": true, "base_dir": request.base_dir})))
}
