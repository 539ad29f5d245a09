use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    conversations::repo::{Conversation, Message},
    error::ApiError,
    rag::{AskResponse, RagError},
    relevance,
    state::AppState,
};

pub const NO_ANSWER_MESSAGE: &str = "Je n'ai pas pu trouver une réponse.";
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Désolé, une erreur s'est produite lors du traitement de votre demande.";
pub const NO_DOCUMENTS_MESSAGE: &str =
    "Aucun document n'est chargé. Veuillez d'abord télécharger un document avant de poser une question.";

pub struct ChatOutcome {
    pub conversation: Conversation,
    pub created: bool,
    pub user_message: Message,
    pub assistant_message: Message,
}

/// Builds the assistant message for a backend outcome. Failures become
/// regular assistant messages so they land in the history instead of being
/// dropped; the no-documents condition gets its own actionable text.
pub fn assistant_reply(question: &str, outcome: Result<AskResponse, RagError>) -> Message {
    match outcome {
        Ok(response) => {
            let mut items = relevance::normalize_context(&response);
            relevance::attach_segments(&mut items, question);

            let mut message = Message::assistant(
                response
                    .response
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| NO_ANSWER_MESSAGE.into()),
            );
            if !items.is_empty() {
                message.context = Some(items);
            }
            message.question = Some(question.to_string());
            message
        }
        Err(RagError::NoDocuments) => Message::assistant(NO_DOCUMENTS_MESSAGE),
        Err(_) => Message::assistant(GENERIC_FAILURE_MESSAGE),
    }
}

/// The send sequence: ensure a conversation exists, persist the user
/// message, query the backend, persist the reply. The two appends are
/// sequential and independent: a crash in between leaves the user message
/// without a reply, which readers must tolerate.
pub async fn send_message(
    state: &AppState,
    user_id: Uuid,
    conversation_id: Option<Uuid>,
    content: &str,
) -> Result<ChatOutcome, ApiError> {
    let (conversation, created) = match conversation_id {
        Some(id) => {
            let conversation = Conversation::find_owned(&state.db, id, user_id)
                .await?
                .ok_or_else(|| ApiError::NotFound("Conversation non trouvée".into()))?;
            (conversation, false)
        }
        None => {
            let conversation = Conversation::create(&state.db, user_id).await?;
            info!(conversation_id = %conversation.id, %user_id, "conversation created for first message");
            (conversation, true)
        }
    };

    let user_message = Message::user(content);
    Conversation::append_message(&state.db, conversation.id, user_id, user_message.clone())
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation non trouvée".into()))?;

    let outcome = state.rag.ask_question(content, user_id).await;
    if let Err(e) = &outcome {
        warn!(conversation_id = %conversation.id, error = %e, "rag call failed, recording error reply");
    }

    let assistant_message = assistant_reply(content, outcome);
    let conversation = Conversation::append_message(
        &state.db,
        conversation.id,
        user_id,
        assistant_message.clone(),
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Conversation non trouvée".into()))?;

    Ok(ChatOutcome {
        conversation,
        created,
        user_message,
        assistant_message,
    })
}
