use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{info, instrument};

use crate::{
    auth::{extractors::AuthUser, repo::User, ProfileResponse},
    error::ApiError,
    limit::client_key,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(me))
        .route("/users/avatar", post(upload_avatar))
        .layer(DefaultBodyLimit::max(5 * 1024 * 1024)) // 5MB avatars
}

#[instrument(skip(state, headers))]
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    if !state.limiter.allow(&client_key(&headers)).await? {
        return Err(ApiError::RateLimited);
    }

    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(Json(ProfileResponse {
        id: user.id,
        email: user.email,
        avatar_url: user.avatar_url,
    }))
}

#[instrument(skip(state, multipart))]
pub async fn upload_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let mut upload: Option<(Bytes, String)> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::Validation(e.to_string()))?;
            upload = Some((data, content_type));
        }
    }
    let (body, content_type) =
        upload.ok_or_else(|| ApiError::Validation("file is required".into()))?;

    // One key per user, so a re-upload overwrites the previous avatar.
    let ext = ext_from_mime(&content_type).unwrap_or("bin");
    let key = format!("avatars/user_{user_id}.{ext}");
    state.storage.put_object(&key, body, &content_type).await?;

    let url = state.storage.public_url(&key);
    User::set_avatar(&state.db, user_id, &url).await?;

    info!(user_id = %user_id, "avatar updated");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "avatar_url": url })),
    ))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn ext_from_mime() {
        assert_eq!(super::ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(super::ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(super::ext_from_mime("image/png"), Some("png"));
        assert_eq!(super::ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(super::ext_from_mime("application/octet-stream"), None);
    }
}
