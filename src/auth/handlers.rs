use axum::{
    extract::{FromRef, Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{ConfirmQuery, LoginForm, RegisterForm, TokenResponse},
        jwt::TokenKeys,
        password::{hash_password, verify_password},
        repo::User,
        session::{
            access_cookie, bearer_access_cookie, expired_cookie, refresh_cookie, ACCESS_COOKIE,
            REFRESH_COOKIE,
        },
    },
    email,
    error::ApiError,
    state::AppState,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/auth/token", post(issue_token))
        .route("/auth/confirm-email", get(confirm_email))
}

/// Logged-in browsers land on their address book; everyone else gets a
/// plain greeting.
#[instrument(skip(state, jar))]
pub async fn home(State(state): State<AppState>, jar: CookieJar) -> Response {
    let keys = TokenKeys::from_ref(&state);
    if let Some(cookie) = jar.get(ACCESS_COOKIE) {
        let token = cookie.value().trim_start_matches("Bearer ");
        if keys.decode_access(token).is_ok() {
            return Redirect::to("/contacts").into_response();
        }
    }
    "Contacts API".into_response()
}

#[instrument(skip(state, form))]
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Redirect, ApiError> {
    if !is_valid_email(&form.email) {
        warn!(email = %form.email, "invalid email");
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if form.password.len() < 6 {
        warn!("password too short");
        return Err(ApiError::Validation("Password too short".into()));
    }

    if User::find_by_email(&state.db, &form.email).await?.is_some() {
        warn!(email = %form.email, "email already registered");
        return Err(ApiError::Duplicate("user"));
    }

    let digest = hash_password(&form.password)?;
    let user = User::create(&state.db, &form.email, form.full_name.as_deref(), &digest).await?;

    let keys = TokenKeys::from_ref(&state);
    let token = keys.sign_verification(&user.email)?;
    email::spawn_verification(state.mailer.clone(), user.email.clone(), token);

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(Redirect::to("/login?success=1"))
}

/// Cookie login flow. Unknown email and bad password collapse into the same
/// 401 so the response does not reveal which check failed.
#[instrument(skip(state, jar, form))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Redirect), ApiError> {
    let user = User::find_by_email(&state.db, &form.email)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if !verify_password(&form.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::Unauthorized);
    }

    let keys = TokenKeys::from_ref(&state);
    let access = keys.sign_access(user.id)?;
    let refresh = keys.sign_refresh(user.id)?;

    let jar = jar
        .add(access_cookie(access, keys.access_ttl))
        .add(refresh_cookie(refresh, keys.refresh_ttl));

    info!(user_id = %user.id, "user logged in");
    Ok((jar, Redirect::to("/contacts")))
}

/// Bearer login flow: token in the body for API clients, plus a
/// scheme-prefixed cookie for browsers that share the origin.
#[instrument(skip(state, jar, form))]
pub async fn issue_token(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Json<TokenResponse>), ApiError> {
    let user = User::find_by_email(&state.db, &form.email)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    if !verify_password(&form.password, &user.password_hash)? {
        warn!(user_id = %user.id, "token request invalid password");
        return Err(ApiError::Unauthorized);
    }

    let keys = TokenKeys::from_ref(&state);
    let access = keys.sign_access(user.id)?;
    let jar = jar.add(bearer_access_cookie(&access));

    info!(user_id = %user.id, "bearer token issued");
    Ok((
        jar,
        Json(TokenResponse {
            access_token: access,
            token_type: "bearer",
        }),
    ))
}

#[instrument(skip(jar))]
pub async fn logout(jar: CookieJar) -> (CookieJar, Redirect) {
    let jar = jar
        .remove(Cookie::from(ACCESS_COOKIE))
        .remove(Cookie::from(REFRESH_COOKIE))
        .add(expired_cookie(ACCESS_COOKIE))
        .add(expired_cookie(REFRESH_COOKIE));
    (jar, Redirect::to("/login"))
}

/// Any decode failure is the same generic 400; an unknown subject is a 404.
/// Re-confirming an already verified user is a no-op.
#[instrument(skip(state, query))]
pub async fn confirm_email(
    State(state): State<AppState>,
    Query(query): Query<ConfirmQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let keys = TokenKeys::from_ref(&state);
    let claims = keys
        .decode_verification(&query.token)
        .map_err(|_| ApiError::InvalidToken)?;

    let user = User::find_by_email(&state.db, &claims.sub)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    if !user.is_verified {
        User::mark_verified(&state.db, user.id).await?;
    }

    info!(user_id = %user.id, "email confirmed");
    Ok(Json(serde_json::json!({ "message": "Email confirmed" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("a.b+c@sub.domain.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("spaces in@example.com"));
    }

    #[test]
    fn token_response_serialization() {
        let body = TokenResponse {
            access_token: "abc".into(),
            token_type: "bearer",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"access_token\":\"abc\""));
        assert!(json.contains("\"token_type\":\"bearer\""));
    }
}
