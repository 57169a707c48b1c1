/// Nova Firebase Admin
///
/// Composition root for the Firebase server-side clients:
/// - [`FirebaseConfig`] loads project settings from the environment, inline
///   JSON or a config file
/// - [`FirebaseApp`] hands out auth (token verification) and messaging (FCM)
///   clients bound to one project and one HTTP connection pool
pub mod config;

use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::info;

use nova_fcm_shared::{AccessTokenSource, FCMClient, FcmResult};
use nova_firebase_auth::{AuthClient, AuthResult, TokenVerifier, TokenVerifierConfig};

pub use config::FirebaseConfig;
pub use nova_fcm_shared as messaging;
pub use nova_firebase_auth as auth;

/// A configured Firebase project
#[derive(Debug, Clone)]
pub struct FirebaseApp {
    project_id: String,
    config: FirebaseConfig,
    http_client: reqwest::Client,
}

impl FirebaseApp {
    /// Create an app from `config`; a project id is required
    pub fn new(config: FirebaseConfig) -> Result<Self> {
        let project_id = match config.project_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => bail!(
                "a project id is required; set projectId in FIREBASE_CONFIG or the GOOGLE_CLOUD_PROJECT environment variable"
            ),
        };

        info!(
            project_id = %project_id,
            auth_emulated = config.is_auth_emulated(),
            "Initialized Firebase app"
        );

        Ok(Self {
            project_id,
            config,
            http_client: reqwest::Client::new(),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(FirebaseConfig::from_env()?)
    }

    /// Share an existing HTTP client across every service of this app
    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn config(&self) -> &FirebaseConfig {
        &self.config
    }

    /// Token verification for this project
    pub fn auth(&self) -> AuthResult<AuthClient> {
        self.auth_with(TokenVerifierConfig::id_token(), TokenVerifierConfig::session_cookie())
    }

    /// Token verification using custom verifier settings, e.g. other certificate endpoints
    pub fn auth_with(
        &self,
        id_token: TokenVerifierConfig,
        session_cookie: TokenVerifierConfig,
    ) -> AuthResult<AuthClient> {
        Ok(AuthClient::with_verifiers(
            TokenVerifier::with_http_client(self.project_id.clone(), id_token, self.http_client.clone())?,
            TokenVerifier::with_http_client(self.project_id.clone(), session_cookie, self.http_client.clone())?,
            self.config.is_auth_emulated(),
        ))
    }

    /// FCM client for this project, authorized by `token_source`
    pub fn messaging(&self, token_source: Arc<dyn AccessTokenSource>) -> FcmResult<FCMClient> {
        Ok(FCMClient::new(self.project_id.clone(), token_source)?.with_http_client(self.http_client.clone()))
    }
}
