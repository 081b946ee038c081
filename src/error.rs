use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Domain error surfaced by route handlers.
///
/// Store-level integrity errors are translated into these variants at the
/// data-access boundary; handlers never see raw database errors. Internal
/// failures keep their cause for the server log but reach the client as a
/// generic message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid credentials")]
    Unauthorized,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("{0} already exists")]
    Duplicate(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("Too many requests")]
    RateLimited,
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidToken => StatusCode::BAD_REQUEST,
            ApiError::Duplicate(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(cause) = &self {
            error!(error = %cause, "internal error");
        }
        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => ApiError::NotFound("record"),
            sqlx::Error::Database(db) if db.is_unique_violation() => ApiError::Duplicate("record"),
            _ => ApiError::Internal(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidToken.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Duplicate("user").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::NotFound("contact").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn internal_error_does_not_leak_its_cause() {
        let err = ApiError::Internal(anyhow::anyhow!("password column missing"));
        assert_eq!(err.to_string(), "Internal server error");
    }
}
