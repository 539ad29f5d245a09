use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

/// Wire shape of one scored chunk from `POST /ask_question/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredContext {
    pub content: String,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub source: Option<String>,
}

/// Response of `POST /ask_question/`. Older backend revisions return a single
/// opaque `context_used` blob instead of the scored list; both are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskResponse {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub context: Vec<ScoredContext>,
    #[serde(default)]
    pub context_used: Option<String>,
}

/// Per-file status from `POST /upload_files/`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadOutcome {
    pub status: String,
    pub filename: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteDocument {
    pub filename: String,
    #[serde(default)]
    pub size: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// The backend's distinct "no documents uploaded yet" condition.
    #[error("aucun document chargé")]
    NoDocuments,

    #[error("document non trouvé")]
    NotFound,

    #[error("backend indisponible: {0}")]
    Unavailable(String),
}

impl From<RagError> for crate::error::ApiError {
    fn from(e: RagError) -> Self {
        match e {
            RagError::NoDocuments => crate::error::ApiError::NoDocumentsUploaded,
            RagError::NotFound => crate::error::ApiError::NotFound("Document non trouvé".into()),
            RagError::Unavailable(_) => crate::error::ApiError::BackendUnavailable,
        }
    }
}

/// Seam to the external retrieval/generation service. Everything behind it
/// is opaque: this crate only speaks the JSON contract.
#[async_trait]
pub trait RagClient: Send + Sync {
    async fn ask_question(&self, question: &str, user_id: Uuid) -> Result<AskResponse, RagError>;

    async fn upload_file(
        &self,
        user_id: Uuid,
        filename: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<UploadOutcome, RagError>;

    async fn list_documents(&self, user_id: Uuid) -> Result<Vec<RemoteDocument>, RagError>;

    async fn delete_document(&self, user_id: Uuid, filename: &str) -> Result<(), RagError>;
}

#[derive(Clone)]
pub struct HttpRagClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct BackendDetail {
    #[serde(default)]
    detail: Option<String>,
}

impl HttpRagClient {
    pub fn new(base_url: &str) -> Self {
        let http = reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Reads the FastAPI `{detail}` body off a non-2xx response and decides
    /// whether this is the distinct no-documents condition.
    async fn classify_failure(response: reqwest::Response) -> RagError {
        let status = response.status();
        let detail = response
            .json::<BackendDetail>()
            .await
            .ok()
            .and_then(|b| b.detail)
            .unwrap_or_default();

        if status == reqwest::StatusCode::BAD_REQUEST && detail.starts_with("Aucun document") {
            return RagError::NoDocuments;
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return RagError::NotFound;
        }
        warn!(%status, detail = %detail, "rag backend returned an error");
        RagError::Unavailable(if detail.is_empty() {
            format!("HTTP {}", status)
        } else {
            detail
        })
    }
}

fn network(e: reqwest::Error) -> RagError {
    error!(error = %e, "rag backend unreachable");
    RagError::Unavailable(e.to_string())
}

#[async_trait]
impl RagClient for HttpRagClient {
    async fn ask_question(&self, question: &str, user_id: Uuid) -> Result<AskResponse, RagError> {
        let response = self
            .http
            .post(self.url("/ask_question/"))
            .json(&serde_json::json!({
                "question": question,
                "user_id": user_id.to_string(),
            }))
            .send()
            .await
            .map_err(network)?;

        if !response.status().is_success() {
            return Err(Self::classify_failure(response).await);
        }
        response.json::<AskResponse>().await.map_err(network)
    }

    async fn upload_file(
        &self,
        user_id: Uuid,
        filename: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<UploadOutcome, RagError> {
        let part = reqwest::multipart::Part::bytes(body.to_vec())
            .file_name(filename.to_string())
            .mime_str(content_type)
            .map_err(|e| RagError::Unavailable(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("files", part)
            .text("user_id", user_id.to_string());

        let response = self
            .http
            .post(self.url("/upload_files/"))
            .multipart(form)
            .send()
            .await
            .map_err(network)?;

        if !response.status().is_success() {
            return Err(Self::classify_failure(response).await);
        }

        // The backend answers with either one outcome or a list of them.
        let value = response.json::<serde_json::Value>().await.map_err(network)?;
        let outcome = match &value {
            serde_json::Value::Array(items) => items.first().cloned(),
            _ => Some(value.clone()),
        };
        outcome
            .and_then(|v| serde_json::from_value::<UploadOutcome>(v).ok())
            .ok_or_else(|| RagError::Unavailable("réponse d'upload illisible".into()))
    }

    async fn list_documents(&self, user_id: Uuid) -> Result<Vec<RemoteDocument>, RagError> {
        let response = self
            .http
            .get(self.url(&format!("/get_uploaded_filenames/{}", user_id)))
            .send()
            .await
            .map_err(network)?;

        // 404 means "this user has uploaded nothing yet", not an error.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(Self::classify_failure(response).await);
        }
        response.json::<Vec<RemoteDocument>>().await.map_err(network)
    }

    async fn delete_document(&self, user_id: Uuid, filename: &str) -> Result<(), RagError> {
        let response = self
            .http
            .delete(self.url("/documents/delete/"))
            .json(&serde_json::json!({
                "user_id": user_id.to_string(),
                "filename": filename,
            }))
            .send()
            .await
            .map_err(network)?;

        if !response.status().is_success() {
            return Err(Self::classify_failure(response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_response_accepts_scored_list() {
        let json = r#"{
            "question": "q",
            "response": "réponse",
            "context": [
                {"content": "a", "score": 95, "source": "doc.pdf"},
                {"content": "b", "score": 50}
            ]
        }"#;
        let parsed: AskResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.response.as_deref(), Some("réponse"));
        assert_eq!(parsed.context.len(), 2);
        assert_eq!(parsed.context[0].source.as_deref(), Some("doc.pdf"));
        assert!(parsed.context_used.is_none());
    }

    #[test]
    fn ask_response_accepts_opaque_blob() {
        let json = r#"{"response": "ok", "context_used": "un seul bloc de contexte"}"#;
        let parsed: AskResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.context.is_empty());
        assert_eq!(parsed.context_used.as_deref(), Some("un seul bloc de contexte"));
    }

    #[test]
    fn upload_outcome_success_flag() {
        let ok: UploadOutcome =
            serde_json::from_str(r#"{"status": "success", "filename": "a.pdf"}"#).unwrap();
        assert!(ok.is_success());

        let failed: UploadOutcome = serde_json::from_str(
            r#"{"status": "error", "filename": "b.pdf", "error": "Fichier vide"}"#,
        )
        .unwrap();
        assert!(!failed.is_success());
        assert_eq!(failed.error.as_deref(), Some("Fichier vide"));
    }
}
