use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use base64::{engine::general_purpose, Engine};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::auth::repo::User;
use crate::config::SessionConfig;
use crate::error::ApiError;
use crate::state::AppState;

pub const COOKIE_NAME: &str = "session";

/// User fields embedded in the cookie. They are a display hint only: every
/// request re-reads the users table, so a stale cookie cannot mask a profile
/// edit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// The cookie IS the session record: nothing is stored server-side, so a
/// session cannot be revoked before its Max-Age runs out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user: SessionUser,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

impl Session {
    /// New session with a fresh random token.
    pub fn issue(user: &User) -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        Self {
            id,
            user: SessionUser::from(user),
        }
    }

    /// Same session id, refreshed user fields. Used after a profile update so
    /// the cookie stops echoing old data.
    pub fn refresh(id: String, user: &User) -> Self {
        Self {
            id,
            user: SessionUser::from(user),
        }
    }

    /// Base64 over the JSON record: raw JSON is not a valid cookie-value.
    pub fn encode(&self) -> String {
        let json = serde_json::to_string(self).expect("session serializes");
        general_purpose::STANDARD.encode(json)
    }

    pub fn decode(value: &str) -> Option<Self> {
        let bytes = general_purpose::STANDARD.decode(value).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

pub fn set_cookie(session: &Session, cfg: &SessionConfig) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}{}",
        COOKIE_NAME,
        session.encode(),
        cfg.max_age_secs,
        if cfg.cookie_secure { "; Secure" } else { "" }
    )
}

pub fn clear_cookie() -> String {
    format!("{}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0", COOKIE_NAME)
}

/// Pull the session out of the `Cookie` header. Soft failure: a missing or
/// malformed cookie is simply "no session".
pub fn from_headers(headers: &HeaderMap) -> Option<Session> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    let value = cookie_header
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))?;
    Session::decode(value)
}

/// Authenticated caller. Parses the cookie, then re-fetches the user row so
/// profile edits stay visible without forcing a re-login; a vanished user
/// invalidates the session.
pub struct CurrentUser {
    pub session_id: String,
    pub user: User,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = from_headers(&parts.headers).ok_or(ApiError::Unauthenticated)?;

        let user = User::find_by_id(&state.db, session.user.id)
            .await
            .map_err(ApiError::Internal)?
            .ok_or_else(|| {
                warn!(user_id = %session.user.id, "session references a missing user");
                ApiError::Unauthenticated
            })?;

        Ok(CurrentUser {
            session_id: session.id,
            user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn sample_session() -> Session {
        Session {
            id: "tok123".into(),
            user: SessionUser {
                id: Uuid::new_v4(),
                email: "a@x.com".into(),
                first_name: "A".into(),
                last_name: "B".into(),
            },
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let session = sample_session();
        let decoded = Session::decode(&session.encode()).expect("decodes");
        assert_eq!(decoded, session);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Session::decode("not base64 !!!").is_none());
        let not_json = general_purpose::STANDARD.encode("hello");
        assert!(Session::decode(&not_json).is_none());
    }

    #[test]
    fn cookie_value_uses_camel_case_fields() {
        let session = sample_session();
        let json = general_purpose::STANDARD.decode(session.encode()).unwrap();
        let json = String::from_utf8(json).unwrap();
        assert!(json.contains("\"firstName\""));
        assert!(json.contains("\"lastName\""));
    }

    #[test]
    fn set_cookie_carries_contract_attributes() {
        let cfg = SessionConfig {
            cookie_secure: false,
            max_age_secs: 60 * 60 * 24 * 7,
        };
        let cookie = set_cookie(&sample_session(), &cfg);
        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(!cookie.contains("Secure"));

        let prod = SessionConfig {
            cookie_secure: true,
            max_age_secs: 60,
        };
        assert!(set_cookie(&sample_session(), &prod).contains("; Secure"));
    }

    #[test]
    fn from_headers_parses_among_other_cookies() {
        let session = sample_session();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; session={}; lang=fr", session.encode()))
                .unwrap(),
        );
        assert_eq!(from_headers(&headers), Some(session));
    }

    #[test]
    fn from_headers_soft_fails() {
        assert_eq!(from_headers(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("session=broken"));
        assert_eq!(from_headers(&headers), None);
    }

    #[test]
    fn issued_tokens_differ() {
        let user = User {
            id: Uuid::new_v4(),
            email: "a@x.com".into(),
            first_name: "A".into(),
            last_name: "B".into(),
            password_hash: "h".into(),
            created_at: time::OffsetDateTime::UNIX_EPOCH,
        };
        let a = Session::issue(&user);
        let b = Session::issue(&user);
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 32);
    }
}
