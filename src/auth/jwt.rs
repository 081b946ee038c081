use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::config::JwtConfig;
use crate::state::AppState;

/// Token flavor. Each one signs with its own secret so a leaked
/// verification link can never be replayed as a login credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
    EmailVerification,
}

/// Signed claim set shared by all three flavors. `sub` is the stringified
/// user id for access/refresh tokens and the email for verification tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

impl Claims {
    pub fn user_id(&self) -> anyhow::Result<i64> {
        self.sub
            .parse::<i64>()
            .map_err(|_| anyhow::anyhow!("subject is not a user id"))
    }
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Holds the signing material and TTLs for all three token flavors.
#[derive(Clone)]
pub struct TokenKeys {
    access: KeyPair,
    refresh: KeyPair,
    verification: KeyPair,
    algorithm: Algorithm,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub verification_ttl: Duration,
}

impl FromRef<AppState> for TokenKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from_config(&state.config.jwt)
    }
}

impl TokenKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            access: KeyPair::from_secret(&cfg.access_secret),
            refresh: KeyPair::from_secret(&cfg.refresh_secret),
            verification: KeyPair::from_secret(&cfg.email_secret),
            algorithm: cfg.algorithm,
            access_ttl: Duration::minutes(cfg.access_ttl_minutes),
            refresh_ttl: Duration::days(cfg.refresh_ttl_days),
            verification_ttl: Duration::hours(cfg.verification_ttl_hours),
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
            TokenKind::EmailVerification => &self.verification,
        }
    }

    fn default_ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
            TokenKind::EmailVerification => self.verification_ttl,
        }
    }

    /// TTL defaults come from configuration; callers may override per call.
    /// `exp` is always absolute epoch time.
    pub fn sign(
        &self,
        kind: TokenKind,
        subject: &str,
        ttl_override: Option<Duration>,
    ) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = ttl_override.unwrap_or_else(|| self.default_ttl(kind));
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: (now + ttl).unix_timestamp() as usize,
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.keys(kind).encoding)?;
        debug!(subject = %subject, kind = ?kind, "token signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: i64) -> anyhow::Result<String> {
        self.sign(TokenKind::Access, &user_id.to_string(), None)
    }

    pub fn sign_refresh(&self, user_id: i64) -> anyhow::Result<String> {
        self.sign(TokenKind::Refresh, &user_id.to_string(), None)
    }

    pub fn sign_verification(&self, email: &str) -> anyhow::Result<String> {
        self.sign(TokenKind::EmailVerification, email, None)
    }

    /// Signature and expiry are checked together; every failure collapses to
    /// one opaque error so callers cannot tell expired from tampered.
    pub fn decode(&self, kind: TokenKind, token: &str) -> anyhow::Result<Claims> {
        let validation = Validation::new(self.algorithm);
        let data = decode::<Claims>(token, &self.keys(kind).decoding, &validation)
            .map_err(|_| anyhow::anyhow!("invalid token"))?;
        Ok(data.claims)
    }

    pub fn decode_access(&self, token: &str) -> anyhow::Result<Claims> {
        self.decode(TokenKind::Access, token)
    }

    pub fn decode_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        self.decode(TokenKind::Refresh, token)
    }

    pub fn decode_verification(&self, token: &str) -> anyhow::Result<Claims> {
        self.decode(TokenKind::EmailVerification, token)
    }
}
