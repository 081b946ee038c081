use axum::{
    extract::{FromRef, Request, State},
    http::{header::SET_COOKIE, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::auth::jwt::TokenKeys;
use crate::state::AppState;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

// Reachable without any token. The confirmation link arrives in a mail
// client with no cookies attached, so it has to be listed here.
const PUBLIC_PATHS: &[&str] = &["/login", "/register", "/auth/token", "/auth/confirm-email"];

/// Identity established by the gate, stashed in request extensions so
/// downstream extractors do not re-verify the same token.
#[derive(Debug, Clone, Copy)]
pub struct SessionUser(pub i64);

/// Outcome of inspecting the two session cookies for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionDecision {
    Authenticated { user_id: i64 },
    Refreshable { user_id: i64, access_token: String },
    Unauthenticated,
}

/// Exact match or prefix match with a trailing path boundary, ignoring
/// trailing slashes. The bare root is always public.
pub fn is_public_path(path: &str) -> bool {
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        return true;
    }
    PUBLIC_PATHS
        .iter()
        .any(|p| path == *p || path.starts_with(&format!("{p}/")))
}

/// Pure decision function; all cookie and redirect side effects stay at the
/// call site.
pub fn evaluate(keys: &TokenKeys, access: Option<&str>, refresh: Option<&str>) -> SessionDecision {
    if access.is_none() && refresh.is_none() {
        // Fail closed: no cookies at all means no silent refresh to attempt.
        return SessionDecision::Unauthenticated;
    }

    if let Some(token) = access {
        if let Ok(claims) = keys.decode_access(token) {
            if let Ok(user_id) = claims.user_id() {
                return SessionDecision::Authenticated { user_id };
            }
        }
    }

    if let Some(token) = refresh {
        if let Ok(claims) = keys.decode_refresh(token) {
            if let Ok(user_id) = claims.user_id() {
                if let Ok(access_token) = keys.sign_access(user_id) {
                    return SessionDecision::Refreshable {
                        user_id,
                        access_token,
                    };
                }
            }
        }
    }

    SessionDecision::Unauthenticated
}

fn session_cookie(name: &'static str, value: String, max_age: Duration) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .max_age(max_age)
        .build()
}

pub fn access_cookie(token: String, max_age: Duration) -> Cookie<'static> {
    session_cookie(ACCESS_COOKIE, token, max_age)
}

pub fn refresh_cookie(token: String, max_age: Duration) -> Cookie<'static> {
    session_cookie(REFRESH_COOKIE, token, max_age)
}

/// Bearer-flow cookie: no max-age, value prefixed with the scheme.
pub fn bearer_access_cookie(token: &str) -> Cookie<'static> {
    Cookie::build((ACCESS_COOKIE, format!("Bearer {token}")))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .build()
}

/// Empty value plus immediate expiry, covering both clearing mechanisms
/// clients understand.
pub fn expired_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = session_cookie(name, String::new(), Duration::ZERO);
    cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
    cookie
}

/// Request-level state machine. Public paths pass through untouched; for
/// everything else the decision above turns into pass-through, silent
/// refresh, or a 303 to the login entry point. The gate never touches the
/// database and keeps no state across requests.
pub async fn session_gate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if is_public_path(req.uri().path()) {
        return next.run(req).await;
    }

    let jar = CookieJar::from_headers(req.headers());
    // The bearer login flow writes a "Bearer "-prefixed cookie value.
    let access = jar
        .get(ACCESS_COOKIE)
        .map(|c| c.value().trim_start_matches("Bearer ").to_string());
    let refresh = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string());

    let keys = TokenKeys::from_ref(&state);
    match evaluate(&keys, access.as_deref(), refresh.as_deref()) {
        SessionDecision::Authenticated { user_id } => {
            req.extensions_mut().insert(SessionUser(user_id));
            next.run(req).await
        }
        SessionDecision::Refreshable {
            user_id,
            access_token,
        } => {
            debug!(user_id = %user_id, "access token refreshed from refresh token");
            req.extensions_mut().insert(SessionUser(user_id));
            let mut res = next.run(req).await;
            let cookie = access_cookie(access_token, keys.access_ttl);
            if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
                res.headers_mut().append(SET_COOKIE, value);
            }
            res
        }
        SessionDecision::Unauthenticated => Redirect::to("/login").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn make_keys() -> TokenKeys {
        TokenKeys::from_ref(&AppState::fake())
    }

    #[test]
    fn public_path_matching() {
        assert!(is_public_path("/"));
        assert!(is_public_path("/login"));
        assert!(is_public_path("/login/"));
        assert!(is_public_path("/login/reset"));
        assert!(is_public_path("/register"));
        assert!(is_public_path("/auth/token"));
        assert!(is_public_path("/auth/confirm-email"));
        assert!(!is_public_path("/loginX"));
        assert!(!is_public_path("/contacts"));
        assert!(!is_public_path("/users/me"));
    }

    #[tokio::test]
    async fn no_cookies_is_unauthenticated() {
        let keys = make_keys();
        assert_eq!(evaluate(&keys, None, None), SessionDecision::Unauthenticated);
    }

    #[tokio::test]
    async fn valid_access_token_authenticates() {
        let keys = make_keys();
        let access = keys.sign_access(11).expect("sign access");
        assert_eq!(
            evaluate(&keys, Some(&access), None),
            SessionDecision::Authenticated { user_id: 11 }
        );
    }

    #[tokio::test]
    async fn expired_access_with_valid_refresh_is_refreshable() {
        let keys = make_keys();
        let stale = keys
            .sign(
                crate::auth::jwt::TokenKind::Access,
                "11",
                Some(Duration::minutes(-5)),
            )
            .expect("sign stale access");
        let refresh = keys.sign_refresh(11).expect("sign refresh");
        match evaluate(&keys, Some(&stale), Some(&refresh)) {
            SessionDecision::Refreshable {
                user_id,
                access_token,
            } => {
                assert_eq!(user_id, 11);
                let claims = keys.decode_access(&access_token).expect("fresh token decodes");
                assert_eq!(claims.user_id().expect("numeric subject"), 11);
            }
            other => panic!("expected Refreshable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_token_alone_is_refreshable() {
        let keys = make_keys();
        let refresh = keys.sign_refresh(3).expect("sign refresh");
        assert!(matches!(
            evaluate(&keys, None, Some(&refresh)),
            SessionDecision::Refreshable { user_id: 3, .. }
        ));
    }

    #[tokio::test]
    async fn invalid_refresh_is_unauthenticated() {
        let keys = make_keys();
        assert_eq!(
            evaluate(&keys, Some("garbage"), Some("also-garbage")),
            SessionDecision::Unauthenticated
        );
        // Access token offered where a refresh token belongs must not pass.
        let access = keys.sign_access(1).expect("sign access");
        assert_eq!(
            evaluate(&keys, None, Some(&access)),
            SessionDecision::Unauthenticated
        );
    }

    #[test]
    fn cookie_attributes() {
        let c = access_cookie("tok".into(), Duration::minutes(5));
        assert_eq!(c.name(), ACCESS_COOKIE);
        assert_eq!(c.http_only(), Some(true));
        assert_eq!(c.secure(), Some(true));
        assert_eq!(c.same_site(), Some(SameSite::None));
        assert_eq!(c.max_age(), Some(Duration::minutes(5)));

        let r = refresh_cookie("tok".into(), Duration::days(7));
        assert_eq!(r.max_age(), Some(Duration::days(7)));

        let gone = expired_cookie(ACCESS_COOKIE);
        assert_eq!(gone.value(), "");
        assert_eq!(gone.max_age(), Some(Duration::ZERO));
    }

    fn gated_app() -> Router {
        let state = AppState::fake();
        Router::new()
            .route("/contacts", get(|| async { "contacts" }))
            .route("/login", get(|| async { "login" }))
            .layer(middleware::from_fn_with_state(state.clone(), session_gate))
            .with_state(state)
    }

    #[tokio::test]
    async fn public_path_passes_without_cookies() {
        let res = gated_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/login")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_path_without_cookies_redirects() {
        let res = gated_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/contacts")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            res.headers().get(header::LOCATION).expect("location header"),
            "/login"
        );
    }

    #[tokio::test]
    async fn valid_access_cookie_passes_through_unchanged() {
        let keys = make_keys();
        let access = keys.sign_access(1).expect("sign access");
        let res = gated_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/contacts")
                    .header(header::COOKIE, format!("access_token={access}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn refresh_cookie_alone_runs_handler_and_sets_new_access_cookie() {
        let keys = make_keys();
        let refresh = keys.sign_refresh(1).expect("sign refresh");
        let res = gated_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/contacts")
                    .header(header::COOKIE, format!("refresh_token={refresh}"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        let set_cookie = res
            .headers()
            .get(header::SET_COOKIE)
            .expect("new access cookie")
            .to_str()
            .expect("header is ascii");
        assert!(set_cookie.starts_with("access_token="));
        assert!(set_cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn invalid_tokens_redirect_without_invoking_handler() {
        let res = gated_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/contacts")
                    .header(
                        header::COOKIE,
                        "access_token=garbage; refresh_token=garbage",
                    )
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
    }
}
