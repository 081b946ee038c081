use bcrypt::{hash, verify, DEFAULT_COST};
use tracing::error;

// bcrypt only keys off the first 72 bytes; truncate explicitly so the limit
// is visible here rather than buried in the algorithm.
const MAX_PASSWORD_BYTES: usize = 72;

fn truncated(plain: &str) -> &[u8] {
    let bytes = plain.as_bytes();
    &bytes[..bytes.len().min(MAX_PASSWORD_BYTES)]
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    hash(truncated(plain), DEFAULT_COST).map_err(|e| {
        error!(error = %e, "bcrypt hash error");
        anyhow::anyhow!(e.to_string())
    })
}

/// Mismatch is `Ok(false)`; only a malformed digest is an error.
pub fn verify_password(plain: &str, digest: &str) -> anyhow::Result<bool> {
    verify(truncated(plain), digest).map_err(|e| {
        error!(error = %e, "bcrypt verify error");
        anyhow::anyhow!(e.to_string())
    })
}
