//! Consultation chat.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use teleconsult_core::{ChatDraft, ChatMessage, Notification, NotificationKind};
use teleconsult_store::Store;

use super::participant_consultation;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Characters of a message shown in its notification.
const PREVIEW_CHARS: usize = 80;

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let mut short: String = text.chars().take(PREVIEW_CHARS).collect();
    short.push_str("...");
    short
}

/// Chat history response.
#[derive(Debug, Serialize)]
pub struct ListMessagesResponse {
    /// Messages in creation order.
    pub messages: Vec<ChatMessage>,
}

/// List a consultation's messages.
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(consultation_id): Path<String>,
) -> Result<Json<ListMessagesResponse>, ApiError> {
    let consultation = participant_consultation(&state, &consultation_id, &auth.user_id).await?;
    let messages = state.store.list_chat_messages(&consultation.id).await?;
    Ok(Json(ListMessagesResponse { messages }))
}

/// Send message request.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Message text.
    pub text: String,
}

/// Append a message to a consultation's chat.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(consultation_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<ChatMessage>, ApiError> {
    let consultation = participant_consultation(&state, &consultation_id, &auth.user_id).await?;
    let draft = ChatDraft::new(consultation.id, auth.user_id, &body.text)?;

    let message = state.store.append_chat_message(draft).await?;

    let recipient = if consultation.patient_id == auth.user_id {
        consultation.professional_id
    } else {
        consultation.patient_id
    };
    let notification = Notification::new(
        recipient,
        NotificationKind::ChatMessage,
        "New message",
        preview(&message.text),
        json!({ "consultationId": consultation.id, "messageId": message.id }),
    );
    if let Err(e) = state.store.insert_notification(&notification).await {
        tracing::warn!(consultation_id = %consultation.id, error = %e, "Failed to notify chat recipient");
    }

    tracing::debug!(
        consultation_id = %consultation.id,
        message_id = %message.id,
        "Chat message sent"
    );

    Ok(Json(message))
}

/// Mark-read response.
#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    /// Messages newly marked read.
    pub updated: u64,
}

/// Mark the other participant's messages read.
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(consultation_id): Path<String>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let consultation = participant_consultation(&state, &consultation_id, &auth.user_id).await?;
    let updated = state
        .store
        .mark_chat_read(&consultation.id, &auth.user_id)
        .await?;
    Ok(Json(MarkReadResponse { updated }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("hola"), "hola");
        let long = "ñ".repeat(100);
        let short = preview(&long);
        assert_eq!(short.chars().count(), PREVIEW_CHARS + 3);
        assert!(short.ends_with("..."));
    }
}
