use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct DocumentInfo {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DocumentsResponse {
    pub documents: Vec<DocumentInfo>,
}

/// Per-file upload report; the upload of each file succeeds or fails on its
/// own.
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub filename: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub results: Vec<FileReport>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteDocumentRequest {
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteDocumentResponse {
    pub success: bool,
}
