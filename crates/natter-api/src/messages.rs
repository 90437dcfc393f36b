use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use natter_db::MessagePatch;
use natter_types::api::{Claims, DeleteMessageResponse, EditMessageRequest, SendMessageRequest};

use crate::auth::AppState;
use crate::error::ApiError;

/// GET /api/messages/{user_id}
pub async fn get_messages(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.conversations.conversation(claims.sub, peer_id).await?;
    Ok(Json(messages))
}

/// POST /api/messages/send/{user_id}
///
/// Responds as soon as the caller's message is stored. A bot answer, if
/// any, arrives later over the gateway.
pub async fn send_message(
    State(state): State<AppState>,
    Path(receiver_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .conversations
        .send_message(claims.sub, receiver_id, req.content(), req.reply_to)
        .await?;

    // Dropping the handle detaches the bot task; it reports over the gateway
    drop(outcome.bot_reply);

    Ok((StatusCode::CREATED, Json(outcome.message)))
}

/// PUT /api/messages/edit/{message_id}
pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let patch = MessagePatch {
        text: req.text,
        image: req.image,
        audio: req.audio,
    };
    let updated = state
        .conversations
        .edit_message(claims.sub, message_id, patch)
        .await?;

    Ok(Json(updated))
}

/// DELETE /api/messages/delete/{message_id}
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .conversations
        .delete_message(claims.sub, message_id)
        .await?;

    Ok(Json(DeleteMessageResponse {
        message: "Message deleted successfully".to_string(),
    }))
}
