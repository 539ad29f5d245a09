use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{get, post, put},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, CheckEmailRequest, CheckEmailResponse,
            LoginRequest, MeResponse, PublicUser, SignupRequest, UpdateProfileRequest,
        },
        password::{hash_password, validate_complexity, verify_password},
        repo::User,
        session::{self, CurrentUser, Session},
    },
    error::ApiError,
    state::AppState,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/check-email", post(check_email))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/user/update-profile", put(update_profile))
        .route("/user/change-password", post(change_password))
}

#[instrument(skip(state, payload))]
async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("Adresse email invalide".into()));
    }
    if payload.first_name.trim().is_empty() || payload.last_name.trim().is_empty() {
        return Err(ApiError::Validation("Tous les champs sont requis".into()));
    }
    if !validate_complexity(&payload.password) {
        warn!("password rejected by complexity rule");
        return Err(ApiError::PasswordComplexity);
    }

    // The check and the insert are not one transaction; the unique index on
    // email is the backstop if two signups race.
    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::DuplicateEmail);
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(
        &state.db,
        &payload.email,
        payload.first_name.trim(),
        payload.last_name.trim(),
        &hash,
    )
    .await?;

    let session = Session::issue(&user);
    let cookie = session::set_cookie(&session, &state.config.session);

    info!(user_id = %user.id, email = %user.email, "user signed up");
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            success: true,
            user: PublicUser::from(&user),
        }),
    ))
}

#[instrument(skip(state, payload))]
async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| {
            warn!(email = %payload.email, "login unknown email");
            ApiError::InvalidCredentials
        })?;

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let session = Session::issue(&user);
    let cookie = session::set_cookie(&session, &state.config.session);

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            success: true,
            user: PublicUser::from(&user),
        }),
    ))
}

/// Clears the cookie and sends the caller back to the landing page.
#[instrument]
async fn logout() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, session::clear_cookie())],
        Redirect::to("/"),
    )
}

/// Signup-form pre-flight; public on purpose.
#[instrument(skip(state, payload))]
async fn check_email(
    State(state): State<AppState>,
    Json(payload): Json<CheckEmailRequest>,
) -> Result<Json<CheckEmailResponse>, ApiError> {
    if payload.email.trim().is_empty() {
        return Err(ApiError::Validation("Email requis".into()));
    }
    let exists = User::find_by_email(&state.db, &payload.email.trim().to_lowercase())
        .await?
        .is_some();
    Ok(Json(CheckEmailResponse { exists }))
}

#[instrument(skip(current))]
async fn get_me(current: CurrentUser) -> Json<MeResponse> {
    Json(MeResponse {
        user: PublicUser::from(&current.user),
    })
}

#[instrument(skip(state, current, payload))]
async fn update_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(mut payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.first_name.trim().is_empty()
        || payload.last_name.trim().is_empty()
        || payload.email.is_empty()
    {
        return Err(ApiError::Validation("Tous les champs sont requis".into()));
    }
    if !is_valid_email(&payload.email) {
        return Err(ApiError::Validation("Adresse email invalide".into()));
    }
    if !verify_password(&payload.current_password, &current.user.password_hash)? {
        return Err(ApiError::Validation("Mot de passe actuel incorrect".into()));
    }
    if payload.email != current.user.email
        && User::email_taken_by_other(&state.db, &payload.email, current.user.id).await?
    {
        return Err(ApiError::EmailTaken);
    }

    let updated = User::update_profile(
        &state.db,
        current.user.id,
        payload.first_name.trim(),
        payload.last_name.trim(),
        &payload.email,
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Utilisateur non trouvé".into()))?;

    // Re-issue the cookie with the refreshed fields; a stale cookie would
    // otherwise keep echoing the old name/email to trusting readers.
    let session = Session::refresh(current.session_id, &updated);
    let cookie = session::set_cookie(&session, &state.config.session);

    info!(user_id = %updated.id, "profile updated");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            success: true,
            user: PublicUser::from(&updated),
        }),
    ))
}

#[instrument(skip(state, current, payload))]
async fn change_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !verify_password(&payload.current_password, &current.user.password_hash)? {
        return Err(ApiError::Validation("Mot de passe actuel incorrect".into()));
    }
    if !validate_complexity(&payload.new_password) {
        return Err(ApiError::PasswordComplexity);
    }

    let hash = hash_password(&payload.new_password)?;
    User::update_password(&state.db, current.user.id, &hash).await?;

    info!(user_id = %current.user.id, "password changed");
    Ok(Json(serde_json::json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_regex_accepts_plausible_addresses() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("jean.dupont@exemple.fr"));
    }

    #[test]
    fn email_regex_rejects_malformed_addresses() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@x.com"));
        assert!(!is_valid_email("@x.com"));
    }
}
