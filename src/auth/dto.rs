use serde::{Deserialize, Serialize};

/// Registration form body.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub full_name: Option<String>,
    pub password: String,
}

/// Login form body, shared by the cookie and bearer flows.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Bearer-flow response body.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    pub token: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub email: String,
    pub avatar_url: Option<String>,
}
