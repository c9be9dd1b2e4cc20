use crate::chain::ids::Id;
use crate::chain::transaction::Auth;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("unsupported auth scheme {0}")]
    UnsupportedScheme(u8),
    #[error("malformed credential: {0}")]
    Malformed(String),
    #[error("signature does not match")]
    BadSignature,
    #[error("verification worker failed: {0}")]
    WorkerFailed(String),
}

/// Verifies transaction credentials. Called from the auth worker pool, so
/// implementations may be CPU heavy but must not block on I/O.
pub trait AuthVm: Send + Sync + 'static {
    fn verify(&self, digest: &Id, auth: &Auth) -> Result<(), AuthError>;
}
