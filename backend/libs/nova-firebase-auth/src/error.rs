//! Auth error types

use thiserror::Error;

/// Errors raised while fetching signing keys or verifying tokens.
///
/// Every failure maps to exactly one variant. Expired tokens are split out from
/// the other verification failures so callers can ask the user to sign in again
/// instead of rejecting the request outright.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Transport or non-2xx failure while fetching public key certificates.
    #[error("Failed to fetch public key certificates: {0}")]
    CertificateRequest(String),

    /// Malformed token, bad signature, claim mismatch, unknown key or missing subject.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The signature checked out but the `exp` claim is in the past.
    #[error("Expired token: {0}")]
    ExpiredToken(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl AuthError {
    pub fn is_expired(&self) -> bool {
        matches!(self, AuthError::ExpiredToken(_))
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
