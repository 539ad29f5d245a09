use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::session::CurrentUser,
    conversations::repo::{Conversation, Message},
    documents::dto::{
        DeleteDocumentRequest, DeleteDocumentResponse, DocumentInfo, DocumentsResponse,
        FileReport, UploadResponse,
    },
    error::ApiError,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/documents",
            get(list_documents)
                .post(upload_documents)
                .delete(delete_document)
                .layer(DefaultBodyLimit::max(32 * 1024 * 1024)),
        )
}

/// Extensions the ingestion pipeline accepts.
const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt"];

pub(crate) fn validate_file(filename: &str, size: usize, max_bytes: usize) -> Result<(), String> {
    let extension = filename
        .rsplit('.')
        .next()
        .map(str::to_lowercase)
        .unwrap_or_default();
    if filename.rsplit('.').count() < 2 || !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err("Formats autorisés : PDF, DOCX, TXT.".into());
    }
    if size > max_bytes {
        return Err("Max 10MB par fichier.".into());
    }
    Ok(())
}

pub(crate) fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next().map(str::to_lowercase).as_deref() {
        Some("pdf") => "application/pdf",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[instrument(skip(state, current))]
async fn list_documents(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<DocumentsResponse>, ApiError> {
    let documents = state.rag.list_documents(current.user.id).await?;
    Ok(Json(DocumentsResponse {
        documents: documents
            .into_iter()
            .map(|d| DocumentInfo {
                filename: d.filename,
                size: d.size,
            })
            .collect(),
    }))
}

/// Accepts `files` multipart parts plus an optional `conversation_id` text
/// part. Validation (type, size, quota) happens before any byte reaches the
/// backend; accepted files are then forwarded one by one and reported
/// individually, into the conversation too when one is given.
#[instrument(skip(state, current, multipart))]
async fn upload_documents(
    State(state): State<AppState>,
    current: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut files: Vec<(String, Bytes)> = Vec::new();
    let mut conversation_id: Option<Uuid> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("files") | Some("files[]") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::Validation("Nom de fichier manquant".into()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(e.to_string()))?;
                files.push((filename, data));
            }
            Some("conversation_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::Validation(e.to_string()))?;
                conversation_id = text.parse::<Uuid>().ok();
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(ApiError::Validation("Aucun fichier fourni".into()));
    }

    for (filename, data) in &files {
        if let Err(reason) = validate_file(filename, data.len(), state.config.upload.max_file_bytes)
        {
            warn!(%filename, %reason, "upload rejected before forwarding");
            return Err(ApiError::UploadRejected(reason));
        }
    }

    // Quota check against the backend's current list, before any upload.
    let existing = state.rag.list_documents(current.user.id).await?.len();
    if existing + files.len() > state.config.upload.max_documents {
        warn!(existing, incoming = files.len(), "document quota exceeded");
        return Err(ApiError::UploadRejected(format!(
            "Maximum {} fichiers.",
            state.config.upload.max_documents
        )));
    }

    let mut results = Vec::with_capacity(files.len());
    for (filename, data) in files {
        let outcome = state
            .rag
            .upload_file(current.user.id, &filename, content_type_for(&filename), data)
            .await;

        let report = match outcome {
            Ok(o) if o.is_success() => {
                info!(%filename, user_id = %current.user.id, "document uploaded");
                FileReport {
                    filename,
                    success: true,
                    error: None,
                }
            }
            Ok(o) => FileReport {
                filename,
                success: false,
                error: o.error,
            },
            Err(e) => {
                warn!(%filename, error = %e, "document upload failed");
                FileReport {
                    filename,
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        };

        if let Some(id) = conversation_id {
            let note = if report.success {
                format!("✅ Fichier \"{}\" téléversé avec succès.", report.filename)
            } else {
                format!(
                    "❌ Erreur lors du téléversement du fichier \"{}\".",
                    report.filename
                )
            };
            // Reporting into the conversation is best-effort; the upload
            // result stands either way.
            if let Err(e) =
                Conversation::append_message(&state.db, id, current.user.id, Message::assistant(note))
                    .await
            {
                warn!(conversation_id = %id, error = %e, "could not record upload report");
            }
        }

        results.push(report);
    }

    let success = results.iter().all(|r| r.success);
    Ok(Json(UploadResponse { success, results }))
}

#[instrument(skip(state, current, payload))]
async fn delete_document(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<DeleteDocumentRequest>,
) -> Result<Json<DeleteDocumentResponse>, ApiError> {
    if payload.filename.trim().is_empty() {
        return Err(ApiError::Validation("filename requis".into()));
    }
    state
        .rag
        .delete_document(current.user.id, &payload.filename)
        .await?;
    info!(filename = %payload.filename, user_id = %current.user.id, "document deleted");
    Ok(Json(DeleteDocumentResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_supported_extensions() {
        assert!(validate_file("rapport.pdf", 1024, 10 * 1024 * 1024).is_ok());
        assert!(validate_file("notes.DOCX", 1024, 10 * 1024 * 1024).is_ok());
        assert!(validate_file("liste.txt", 1024, 10 * 1024 * 1024).is_ok());
    }

    #[test]
    fn rejects_unsupported_types() {
        assert!(validate_file("photo.png", 1024, 10 * 1024 * 1024).is_err());
        assert!(validate_file("archive.tar.gz", 1024, 10 * 1024 * 1024).is_err());
        assert!(validate_file("sans-extension", 1024, 10 * 1024 * 1024).is_err());
    }

    #[test]
    fn rejects_oversized_files() {
        let max = 10 * 1024 * 1024;
        assert!(validate_file("gros.pdf", max + 1, max).is_err());
        assert!(validate_file("juste.pdf", max, max).is_ok());
    }

    #[test]
    fn content_types_follow_the_extension() {
        assert_eq!(content_type_for("a.pdf"), "application/pdf");
        assert_eq!(content_type_for("a.txt"), "text/plain");
        assert_eq!(
            content_type_for("a.docx"),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(content_type_for("a"), "application/octet-stream");
    }
}
