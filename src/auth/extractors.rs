use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use crate::auth::jwt::TokenKeys;
use crate::auth::session::{SessionUser, ACCESS_COOKIE};

/// Extracts the authenticated user id. The session gate already verified
/// cookie-borne tokens and left the subject in request extensions; bearer
/// clients are verified here from the Authorization header.
#[derive(Debug)]
pub struct AuthUser(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(SessionUser(user_id)) = parts.extensions.get::<SessionUser>() {
            return Ok(AuthUser(*user_id));
        }

        let header_token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string);
        let cookie_token = CookieJar::from_headers(&parts.headers)
            .get(ACCESS_COOKIE)
            .map(|c| c.value().trim_start_matches("Bearer ").to_string());

        let token = header_token.or(cookie_token).ok_or((
            StatusCode::UNAUTHORIZED,
            "Not authenticated".to_string(),
        ))?;

        let keys = TokenKeys::from_ref(state);
        let claims = keys.decode_access(&token).map_err(|_| {
            warn!("invalid or expired token");
            (
                StatusCode::UNAUTHORIZED,
                "Invalid or expired token".to_string(),
            )
        })?;
        let user_id = claims.user_id().map_err(|_| {
            (
                StatusCode::UNAUTHORIZED,
                "Invalid or expired token".to_string(),
            )
        })?;

        Ok(AuthUser(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use axum::http::Request;

    fn parts_with_header(value: &str) -> Parts {
        let (parts, _) = Request::builder()
            .uri("/users/me")
            .header(AUTHORIZATION, value)
            .body(())
            .expect("request")
            .into_parts();
        parts
    }

    #[tokio::test]
    async fn bearer_header_is_accepted() {
        let state = AppState::fake();
        let keys = TokenKeys::from_ref(&state);
        let token = keys.sign_access(5).expect("sign access");
        let mut parts = parts_with_header(&format!("Bearer {token}"));
        let AuthUser(user_id) = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .expect("extract");
        assert_eq!(user_id, 5);
    }

    #[tokio::test]
    async fn refresh_token_in_header_is_rejected() {
        let state = AppState::fake();
        let keys = TokenKeys::from_ref(&state);
        let token = keys.sign_refresh(5).expect("sign refresh");
        let mut parts = parts_with_header(&format!("Bearer {token}"));
        let err = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .expect_err("refresh token must not authenticate");
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn session_extension_takes_priority() {
        let state = AppState::fake();
        let (mut parts, _) = Request::builder()
            .uri("/users/me")
            .body(())
            .expect("request")
            .into_parts();
        parts.extensions.insert(SessionUser(99));
        let AuthUser(user_id) = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .expect("extract");
        assert_eq!(user_id, 99);
    }

    #[tokio::test]
    async fn missing_credentials_are_rejected() {
        let state = AppState::fake();
        let (mut parts, _) = Request::builder()
            .uri("/users/me")
            .body(())
            .expect("request")
            .into_parts();
        let err = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .expect_err("no credentials");
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }
}
