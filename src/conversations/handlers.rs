use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::session::CurrentUser,
    conversations::{
        dto::{
            AppendMessageRequest, AppendMessageResponse, ConversationDto, ConversationResponse,
            ConversationsResponse, DeleteResponse,
        },
        repo::Conversation,
    },
    error::ApiError,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/conversations/:id",
            delete(delete_conversation)
                .get(get_conversation)
                .put(append_message),
        )
}

#[instrument(skip(state, current))]
async fn list_conversations(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let conversations = Conversation::list_by_user(&state.db, current.user.id).await?;
    Ok(Json(ConversationsResponse {
        conversations: conversations.iter().map(ConversationDto::from).collect(),
    }))
}

#[instrument(skip(state, current))]
async fn create_conversation(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<(StatusCode, Json<ConversationResponse>), ApiError> {
    let conversation = Conversation::create(&state.db, current.user.id).await?;
    info!(conversation_id = %conversation.id, user_id = %current.user.id, "conversation created");
    Ok((
        StatusCode::CREATED,
        Json(ConversationResponse {
            conversation: ConversationDto::from(&conversation),
        }),
    ))
}

#[instrument(skip(state, current))]
async fn get_conversation(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let conversation = Conversation::find_owned(&state.db, id, current.user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation non trouvée".into()))?;
    Ok(Json(ConversationResponse {
        conversation: ConversationDto::from(&conversation),
    }))
}

#[instrument(skip(state, current, payload))]
async fn append_message(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AppendMessageRequest>,
) -> Result<Json<AppendMessageResponse>, ApiError> {
    let message = payload.message;
    Conversation::append_message(&state.db, id, current.user.id, message.clone())
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation non trouvée".into()))?;
    Ok(Json(AppendMessageResponse {
        success: true,
        message,
    }))
}

#[instrument(skip(state, current))]
async fn delete_conversation(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let deleted = Conversation::delete_owned(&state.db, id, current.user.id).await?;
    if !deleted {
        return Err(ApiError::NotFound("Conversation non trouvée".into()));
    }
    info!(conversation_id = %id, user_id = %current.user.id, "conversation deleted");
    Ok(Json(DeleteResponse { success: true }))
}
