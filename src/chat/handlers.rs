use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::session::CurrentUser,
    chat::services,
    conversations::dto::MessageView,
    error::ApiError,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/chat", post(send_message))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    #[serde(default)]
    conversation_id: Option<Uuid>,
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageResponse {
    conversation_id: Uuid,
    title: String,
    created: bool,
    user_message: MessageView,
    assistant_message: MessageView,
}

#[instrument(skip(state, current, payload))]
async fn send_message(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let content = payload.content.trim();
    if content.is_empty() {
        return Err(ApiError::Validation("Message requis".into()));
    }

    let outcome = services::send_message(
        &state,
        current.user.id,
        payload.conversation_id,
        content,
    )
    .await?;

    Ok(Json(SendMessageResponse {
        conversation_id: outcome.conversation.id,
        title: outcome.conversation.title.clone(),
        created: outcome.created,
        user_message: MessageView::from(&outcome.user_message),
        assistant_message: MessageView::from(&outcome.assistant_message),
    }))
}
