use tracing::info;

use crate::error::AuthResult;
use crate::verifier::{TokenVerifier, VerifiedClaims};

/// Environment variable pointing the SDK at a local Firebase Auth emulator
pub const AUTH_EMULATOR_HOST_ENV: &str = "FIREBASE_AUTH_EMULATOR_HOST";

/// Auth facade handed out by the app: verifies ID tokens and session cookies
/// for a single project.
#[derive(Debug)]
pub struct AuthClient {
    emulated: bool,
    id_token_verifier: TokenVerifier,
    session_cookie_verifier: TokenVerifier,
}

impl AuthClient {
    /// Create a client for `project_id`.
    ///
    /// When `emulated` is true tokens are expected to come from the auth
    /// emulator and are accepted unsigned.
    pub fn new(project_id: impl Into<String>, emulated: bool) -> AuthResult<Self> {
        let project_id = project_id.into();
        let client = Self::with_verifiers(
            TokenVerifier::id_token(project_id.clone())?,
            TokenVerifier::session_cookie(project_id.clone())?,
            emulated,
        );

        info!(project_id = %project_id, emulated, "Initialized Firebase auth client");
        Ok(client)
    }

    pub fn with_verifiers(
        id_token_verifier: TokenVerifier,
        session_cookie_verifier: TokenVerifier,
        emulated: bool,
    ) -> Self {
        Self {
            emulated,
            id_token_verifier,
            session_cookie_verifier,
        }
    }

    /// True when configured for the Firebase Auth emulator
    pub fn is_emulated(&self) -> bool {
        self.emulated
    }

    /// Verify a Firebase ID token and return its claims, including `uid`
    pub async fn verify_id_token(&self, token: &str) -> AuthResult<VerifiedClaims> {
        self.id_token_verifier.verify(token, self.emulated).await
    }

    /// Verify a Firebase session cookie and return its claims, including `uid`
    pub async fn verify_session_cookie(&self, cookie: &str) -> AuthResult<VerifiedClaims> {
        self.session_cookie_verifier.verify(cookie, self.emulated).await
    }
}
