use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub cookie_secure: bool,
    pub max_age_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub max_documents: usize,
    pub max_file_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub rag_base_url: String,
    pub session: SessionConfig,
    pub upload: UploadConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let rag_base_url =
            std::env::var("RAG_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:8000".into());
        let session = SessionConfig {
            cookie_secure: std::env::var("APP_ENV")
                .map(|v| v == "production")
                .unwrap_or(false),
            max_age_secs: std::env::var("SESSION_MAX_AGE_SECS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 60 * 24 * 7),
        };
        let upload = UploadConfig {
            max_documents: std::env::var("MAX_DOCUMENTS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(3),
            max_file_bytes: std::env::var("MAX_FILE_BYTES")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(10 * 1024 * 1024),
        };
        Ok(Self {
            database_url,
            rag_base_url,
            session,
            upload,
        })
    }
}
