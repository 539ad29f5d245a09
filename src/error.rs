use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Error taxonomy at the HTTP boundary. Repo and service layers stay on
/// `anyhow`; handlers convert into one of these variants.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Non autorisé")]
    Unauthenticated,

    #[error("{0}")]
    NotFound(String),

    #[error("Cet email est déjà utilisé")]
    DuplicateEmail,

    #[error("Cet email est déjà utilisé")]
    EmailTaken,

    #[error("Email ou mot de passe incorrect")]
    InvalidCredentials,

    #[error("Le mot de passe doit contenir au moins 8 caractères, une majuscule, une minuscule, un chiffre et un caractère spécial")]
    PasswordComplexity,

    #[error("{0}")]
    Validation(String),

    #[error("Le service de recherche documentaire est indisponible")]
    BackendUnavailable,

    #[error("Aucun document chargé. Veuillez d'abord télécharger des documents.")]
    NoDocumentsUploaded,

    #[error("{0}")]
    UploadRejected(String),

    #[error("Erreur serveur")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::DuplicateEmail => StatusCode::CONFLICT,
            ApiError::EmailTaken
            | ApiError::PasswordComplexity
            | ApiError::Validation(_)
            | ApiError::NoDocumentsUploaded
            | ApiError::UploadRejected(_) => StatusCode::BAD_REQUEST,
            ApiError::BackendUnavailable => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Internal(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
