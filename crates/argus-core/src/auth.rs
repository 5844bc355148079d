//! Bearer-token authentication
//!
//! Holds SHA-256 digests of the configured bearer credentials and validates
//! presented tokens in constant time. A deployment with zero configured
//! credentials disables authentication entirely; the middleware checks
//! [`TokenStore::is_enabled`] and bypasses validation in that case.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No credentials provided
    #[error("authentication required")]
    MissingCredentials,

    /// Invalid bearer token
    #[error("invalid credentials")]
    InvalidCredentials,
}

/// Auth result type
pub type Result<T> = std::result::Result<T, AuthError>;

/// Store of accepted bearer-token digests.
///
/// Tokens are never kept in clear; only their SHA-256 digests are retained.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    digests: Vec<[u8; 32]>,
}

fn digest(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

impl TokenStore {
    /// Build a store from the configured tokens. Empty and whitespace-only
    /// entries are ignored.
    #[must_use]
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let digests = tokens
            .into_iter()
            .filter(|t| !t.as_ref().trim().is_empty())
            .map(|t| digest(t.as_ref()))
            .collect();
        Self { digests }
    }

    /// Whether authentication is enforced. False when no credentials are
    /// configured; callers bypass validation entirely then.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.digests.is_empty()
    }

    /// Number of configured credentials.
    #[must_use]
    pub fn credential_count(&self) -> usize {
        self.digests.len()
    }

    /// Validate a presented token against every configured credential,
    /// in constant time per comparison.
    pub fn validate(&self, token: &str) -> Result<()> {
        let presented = digest(token);
        let mut matched = false;
        for accepted in &self.digests {
            matched |= bool::from(presented.ct_eq(accepted));
        }
        if matched {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}
