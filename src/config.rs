use std::str::FromStr;

use anyhow::Context;
use jsonwebtoken::Algorithm;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub email_secret: String,
    pub algorithm: Algorithm,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    pub verification_ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub from: String,
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub cache_url: String,
    pub jwt: JwtConfig,
    pub smtp: SmtpConfig,
    pub storage: StorageConfig,
    pub cors_origins: Vec<String>,
}

fn required(name: &'static str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{name} is not set"))
}

fn required_parsed<T>(name: &'static str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    required(name)?
        .parse::<T>()
        .with_context(|| format!("{name} is not a valid value"))
}

impl AppConfig {
    /// Reads the full configuration from the environment. Every variable is
    /// required; startup fails naming the first missing one.
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            access_secret: required("SECRET_KEY")?,
            refresh_secret: required("REFRESH_SECRET_KEY")?,
            email_secret: required("EMAIL_SECRET_KEY")?,
            algorithm: Algorithm::from_str(&required("ALGORITHM")?)
                .ok()
                .context("ALGORITHM is not a supported signing algorithm")?,
            access_ttl_minutes: required_parsed("ACCESS_TOKEN_EXPIRE_MINUTES")?,
            refresh_ttl_days: required_parsed("REFRESH_TOKEN_EXPIRE_DAYS")?,
            verification_ttl_hours: required_parsed("VERIFICATION_TOKEN_EXPIRE_HOURS")?,
        };
        let smtp = SmtpConfig {
            host: required("SMTP_HOST")?,
            port: required_parsed("SMTP_PORT")?,
            user: required("SMTP_USER")?,
            pass: required("SMTP_PASS")?,
            from: required("MAIL_FROM")?,
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
        };
        let storage = StorageConfig {
            endpoint: required("STORAGE_ENDPOINT")?,
            bucket: required("STORAGE_BUCKET")?,
            access_key: required("STORAGE_ACCESS_KEY")?,
            secret_key: required("STORAGE_SECRET_KEY")?,
        };
        let cors_origins = required("CORS_ORIGINS")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            cache_url: required("CACHE_URL")?,
            jwt,
            smtp,
            storage,
            cors_origins,
        })
    }
}
