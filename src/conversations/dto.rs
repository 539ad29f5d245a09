use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::conversations::repo::{Conversation, Message, Role};
use crate::relevance::{self, ContextView};

#[derive(Debug, Deserialize)]
pub struct AppendMessageRequest {
    pub message: Message,
}

/// A message as served to clients. Assistant messages carrying context get
/// the ready-to-render `contextView` attached.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_view: Option<ContextView>,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        let context_view = match (&message.role, &message.context) {
            (Role::Assistant, Some(items)) => relevance::render_context(
                &message.id,
                items,
                message.question.as_deref().unwrap_or(""),
            ),
            _ => None,
        };
        Self {
            message: message.clone(),
            context_view,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    pub id: Uuid,
    pub title: String,
    pub messages: Vec<MessageView>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&Conversation> for ConversationDto {
    fn from(c: &Conversation) -> Self {
        Self {
            id: c.id,
            title: c.title.clone(),
            messages: c.messages.0.iter().map(MessageView::from).collect(),
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationDto>,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation: ConversationDto,
}

#[derive(Debug, Serialize)]
pub struct AppendMessageResponse {
    pub success: bool,
    pub message: Message,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}
