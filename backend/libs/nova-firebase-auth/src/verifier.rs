//! Signed token verification
//!
//! One verifier implementation serves every token kind; the kinds differ only
//! in the expected issuer and the endpoint their signing certificates live at,
//! both captured in [`TokenVerifierConfig`].

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{decode, decode_header, get_current_timestamp, Algorithm, DecodingKey, Validation};
use serde::Serialize;
use serde_json::{Map, Value};
use std::ops::Deref;
use tracing::debug;
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use crate::certificates::CertificatesFetcher;
use crate::error::{AuthError, AuthResult};

pub const ID_TOKEN_ISSUER_PREFIX: &str = "https://securetoken.google.com/";
pub const ID_TOKEN_CERTIFICATES_URL: &str =
    "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";

pub const SESSION_COOKIE_ISSUER_PREFIX: &str = "https://session.firebase.google.com/";
pub const SESSION_COOKIE_CERTIFICATES_URL: &str =
    "https://www.googleapis.com/identitytoolkit/v3/relyingparty/publicKeys";

/// Per token kind parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenVerifierConfig {
    /// Human readable token kind, used in error messages ("ID token")
    pub label: String,
    /// Issuer without the project id; the expected `iss` is prefix + project id
    pub issuer_prefix: String,
    /// Endpoint serving the key id → certificate mapping
    pub certificates_url: String,
}

impl TokenVerifierConfig {
    pub fn id_token() -> Self {
        Self {
            label: "ID token".to_string(),
            issuer_prefix: ID_TOKEN_ISSUER_PREFIX.to_string(),
            certificates_url: ID_TOKEN_CERTIFICATES_URL.to_string(),
        }
    }

    pub fn session_cookie() -> Self {
        Self {
            label: "session cookie".to_string(),
            issuer_prefix: SESSION_COOKIE_ISSUER_PREFIX.to_string(),
            certificates_url: SESSION_COOKIE_CERTIFICATES_URL.to_string(),
        }
    }

    /// Point the verifier at a different certificate endpoint
    pub fn with_certificates_url(mut self, url: impl Into<String>) -> Self {
        self.certificates_url = url.into();
        self
    }

    pub fn issuer(&self, project_id: &str) -> String {
        format!("{}{}", self.issuer_prefix, project_id)
    }
}

/// Claims of a successfully verified token.
///
/// Always carries a `uid` claim copied from the non-empty `sub` claim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VerifiedClaims {
    #[serde(skip)]
    uid: String,
    claims: Map<String, Value>,
}

impl VerifiedClaims {
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.claims
    }
}

impl Deref for VerifiedClaims {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.claims
    }
}

/// Verifies RS256 signed tokens against certificates fetched from the
/// configured endpoint.
#[derive(Debug)]
pub struct TokenVerifier {
    project_id: String,
    issuer: String,
    config: TokenVerifierConfig,
    certificates: CertificatesFetcher,
}

impl TokenVerifier {
    pub fn new(project_id: impl Into<String>, config: TokenVerifierConfig) -> AuthResult<Self> {
        Self::with_http_client(project_id, config, reqwest::Client::new())
    }

    pub fn with_http_client(
        project_id: impl Into<String>,
        config: TokenVerifierConfig,
        http_client: reqwest::Client,
    ) -> AuthResult<Self> {
        let project_id = project_id.into();
        if project_id.is_empty() {
            return Err(AuthError::InvalidArgument(format!(
                "a project id is required to verify {}s",
                config.label
            )));
        }

        let certificates = CertificatesFetcher::with_http_client(config.certificates_url.clone(), http_client)?;

        Ok(Self {
            issuer: config.issuer(&project_id),
            project_id,
            config,
            certificates,
        })
    }

    /// Verifier for Firebase ID tokens
    pub fn id_token(project_id: impl Into<String>) -> AuthResult<Self> {
        Self::new(project_id, TokenVerifierConfig::id_token())
    }

    /// Verifier for Firebase session cookies
    pub fn session_cookie(project_id: impl Into<String>) -> AuthResult<Self> {
        Self::new(project_id, TokenVerifierConfig::session_cookie())
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Verify `token` and return its claims.
    ///
    /// With `is_emulator` set the token must be unsigned (no signature
    /// segment); its claims are checked but no certificates are fetched.
    /// Certificate fetch failures surface unchanged as
    /// [`AuthError::CertificateRequest`].
    pub async fn verify(&self, token: &str, is_emulator: bool) -> AuthResult<VerifiedClaims> {
        let mut claims = if is_emulator {
            self.decode_unsigned(token)?
        } else {
            self.decode_signed(token).await?
        };

        self.check_issued_at(&claims)?;

        let uid = match claims.get("sub") {
            Some(Value::String(sub)) if !sub.is_empty() => sub.clone(),
            _ => {
                return Err(AuthError::InvalidToken(format!(
                    "{} has no \"sub\" (subject) claim or it is empty",
                    self.config.label
                )))
            }
        };
        claims.insert("uid".to_string(), Value::String(uid.clone()));

        debug!(label = %self.config.label, "Token verified");
        Ok(VerifiedClaims { uid, claims })
    }

    async fn decode_signed(&self, token: &str) -> AuthResult<Map<String, Value>> {
        let header = decode_header(token).map_err(|e| self.map_decode_error(e))?;

        if header.alg != Algorithm::RS256 {
            return Err(self.invalid(format!(
                "has incorrect algorithm {:?}, expected RS256",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| self.invalid("has no \"kid\" header"))?;

        let key = self.find_key(&kid).await?;

        let data = decode::<Map<String, Value>>(token, &key, &self.validation())
            .map_err(|e| self.map_decode_error(e))?;

        Ok(data.claims)
    }

    async fn find_key(&self, kid: &str) -> AuthResult<DecodingKey> {
        let certificates = self.certificates.fetch_certificates().await?;

        let certificate = certificates.get(kid).ok_or_else(|| {
            debug!(kid = %kid, "No certificate for key id");
            self.invalid("has a \"kid\" header which does not correspond to a known public key")
        })?;

        public_key_from_certificate(certificate)
            .map_err(|reason| self.invalid(format!("could not be checked: {}", reason)))
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.project_id]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation
    }

    fn decode_unsigned(&self, token: &str) -> AuthResult<Map<String, Value>> {
        let segments: Vec<&str> = token.split('.').collect();
        let (header, payload) = match segments.as_slice() {
            [header, payload] | [header, payload, ""] => (*header, *payload),
            _ => return Err(self.invalid("must be unsigned when using the auth emulator")),
        };

        decode_segment(header).map_err(|reason| self.invalid(format!("has a malformed header: {}", reason)))?;
        let claims = decode_segment(payload)
            .map_err(|reason| self.invalid(format!("has a malformed payload: {}", reason)))?;

        self.check_registered_claims(&claims)?;
        Ok(claims)
    }

    /// The checks the signature path gets from `jsonwebtoken`, applied by hand
    /// to unsigned emulator tokens: exp first, then iss and aud.
    fn check_registered_claims(&self, claims: &Map<String, Value>) -> AuthResult<()> {
        let exp = claims
            .get("exp")
            .and_then(numeric_claim)
            .ok_or_else(|| self.invalid("has no valid \"exp\" claim"))?;
        if exp < get_current_timestamp() as f64 {
            return Err(AuthError::ExpiredToken(format!("{} has expired", self.config.label)));
        }

        if claims.get("iss").and_then(Value::as_str) != Some(self.issuer.as_str()) {
            return Err(self.invalid(format!("has incorrect \"iss\" (issuer) claim, expected {}", self.issuer)));
        }

        let audience_matches = match claims.get("aud") {
            Some(Value::String(aud)) => aud == &self.project_id,
            Some(Value::Array(auds)) => auds.iter().any(|aud| aud.as_str() == Some(self.project_id.as_str())),
            _ => false,
        };
        if !audience_matches {
            return Err(self.invalid(format!(
                "has incorrect \"aud\" (audience) claim, expected {}",
                self.project_id
            )));
        }

        Ok(())
    }

    fn check_issued_at(&self, claims: &Map<String, Value>) -> AuthResult<()> {
        let iat = claims
            .get("iat")
            .and_then(numeric_claim)
            .ok_or_else(|| self.invalid("has no valid \"iat\" (issued-at) claim"))?;

        if iat > get_current_timestamp() as f64 {
            return Err(self.invalid("is issued in the future"));
        }
        Ok(())
    }

    fn map_decode_error(&self, err: JwtError) -> AuthError {
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::ExpiredToken(format!("{} has expired", self.config.label)),
            _ => self.invalid(format!("failed verification: {}", err)),
        }
    }

    fn invalid(&self, detail: impl std::fmt::Display) -> AuthError {
        AuthError::InvalidToken(format!("{} {}", self.config.label, detail))
    }
}

fn numeric_claim(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn decode_segment(segment: &str) -> Result<Map<String, Value>, String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}

/// Extract the RSA public key of a PEM encoded X.509 certificate.
pub(crate) fn public_key_from_certificate(cert_pem: &str) -> Result<DecodingKey, String> {
    let pem = ::pem::parse(cert_pem.as_bytes()).map_err(|e| format!("failed to parse PEM: {}", e))?;

    let (_, cert) =
        X509Certificate::from_der(pem.contents()).map_err(|e| format!("X.509 parse failed: {}", e))?;

    let spki = cert.public_key();
    match spki.parsed() {
        Ok(PublicKey::RSA(_)) => Ok(DecodingKey::from_rsa_der(&spki.subject_public_key.data)),
        Ok(_) => Err("certificate does not hold an RSA public key".to_string()),
        Err(e) => Err(format!("failed to read public key: {}", e)),
    }
}
