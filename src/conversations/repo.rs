use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "Nouvelle conversation";
pub const WELCOME_MESSAGE: &str = "Bonjour ! Je suis votre assistant RAG. Je peux répondre à vos questions basées sur vos documents. Commencez par télécharger des fichiers ou posez-moi directement une question.";

const TITLE_MAX_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A retrieved passage attached to an assistant reply. `score` is advisory,
/// used only for display ranking. `relevant_segment` is the cached excerpt
/// computed against the question that produced the reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextItem {
    pub content: String,
    pub score: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevant_segment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<ContextItem>>,
    /// The user question this assistant message answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            timestamp: OffsetDateTime::now_utc(),
            context: None,
            question: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            timestamp: OffsetDateTime::now_utc(),
            context: None,
            question: None,
        }
    }

    fn welcome() -> Self {
        Self {
            id: "welcome".into(),
            role: Role::Assistant,
            content: WELCOME_MESSAGE.into(),
            timestamp: OffsetDateTime::now_utc(),
            context: None,
            question: None,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub messages: Json<Vec<Message>>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Title from the first user message, char-truncated to 30 + "...". Returns
/// None while no user message exists.
pub fn derive_title(messages: &[Message]) -> Option<String> {
    let first_user = messages.iter().find(|m| m.role == Role::User)?;
    let content = first_user.content.as_str();
    if content.chars().count() > TITLE_MAX_CHARS {
        let truncated: String = content.chars().take(TITLE_MAX_CHARS).collect();
        Some(format!("{}...", truncated))
    } else {
        Some(content.to_string())
    }
}

impl Conversation {
    /// New conversation seeded with the assistant welcome message.
    pub async fn create(db: &PgPool, user_id: Uuid) -> anyhow::Result<Conversation> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (user_id, title, messages)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, title, messages, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(DEFAULT_TITLE)
        .bind(Json(vec![Message::welcome()]))
        .fetch_one(db)
        .await?;
        Ok(conversation)
    }

    /// Most recently active first: the recency-ranked history contract.
    pub async fn list_by_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, user_id, title, messages, created_at, updated_at
            FROM conversations
            WHERE user_id = $1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Ownership check is part of the lookup, never a separate step.
    pub async fn find_owned(
        db: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<Conversation>> {
        let row = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, user_id, title, messages, created_at, updated_at
            FROM conversations
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    /// Appends a message, bumps updated_at, and derives the title on the
    /// first user message while the title is still the default. Returns the
    /// updated conversation, or None when no owned conversation matches.
    pub async fn append_message(
        db: &PgPool,
        id: Uuid,
        user_id: Uuid,
        message: Message,
    ) -> anyhow::Result<Option<Conversation>> {
        let Some(conversation) = Self::find_owned(db, id, user_id).await? else {
            return Ok(None);
        };

        let mut messages = conversation.messages.0;
        messages.push(message);

        let title = if conversation.title == DEFAULT_TITLE {
            derive_title(&messages).unwrap_or(conversation.title)
        } else {
            conversation.title
        };

        let updated = sqlx::query_as::<_, Conversation>(
            r#"
            UPDATE conversations
            SET messages = $3, title = $4, updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, title, messages, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(Json(messages))
        .bind(title)
        .fetch_optional(db)
        .await?;
        Ok(updated)
    }

    /// True when a row was deleted.
    pub async fn delete_owned(db: &PgPool, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(r#"DELETE FROM conversations WHERE id = $1 AND user_id = $2"#)
            .bind(id)
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_message_seeds_conversations() {
        let m = Message::welcome();
        assert_eq!(m.id, "welcome");
        assert_eq!(m.role, Role::Assistant);
        assert!(m.content.starts_with("Bonjour !"));
    }

    #[test]
    fn derive_title_truncates_to_thirty_chars() {
        let messages = vec![
            Message::welcome(),
            Message::user("Quelle est la météo aujourd'hui et demain?"),
        ];
        assert_eq!(
            derive_title(&messages).as_deref(),
            Some("Quelle est la météo aujourd'hu...")
        );
    }

    #[test]
    fn derive_title_keeps_short_messages_whole() {
        let messages = vec![Message::user("Bonjour")];
        assert_eq!(derive_title(&messages).as_deref(), Some("Bonjour"));
    }

    #[test]
    fn derive_title_requires_a_user_message() {
        let messages = vec![Message::welcome(), Message::assistant("réponse")];
        assert_eq!(derive_title(&messages), None);
    }

    #[test]
    fn derive_title_uses_the_first_user_message() {
        let messages = vec![
            Message::welcome(),
            Message::user("première"),
            Message::user("seconde"),
        ];
        assert_eq!(derive_title(&messages).as_deref(), Some("première"));
    }

    #[test]
    fn message_json_shape_is_camel_case() {
        let mut m = Message::assistant("réponse");
        m.context = Some(vec![ContextItem {
            content: "passage".into(),
            score: 87,
            relevant_segment: Some("extrait".into()),
            source: Some("doc.pdf".into()),
        }]);
        m.question = Some("question ?".into());

        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
        assert_eq!(json["context"][0]["relevantSegment"], "extrait");
        assert_eq!(json["context"][0]["score"], 87);
        assert_eq!(json["question"], "question ?");
    }

    #[test]
    fn optional_fields_are_omitted_for_user_messages() {
        let json = serde_json::to_value(Message::user("salut")).unwrap();
        assert!(json.get("context").is_none());
        assert!(json.get("question").is_none());
    }
}
