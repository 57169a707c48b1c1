/// Nova Firebase Auth Library
///
/// Server-side verification of Firebase-issued tokens:
/// - Public key certificate fetching with Cache-Control driven expiry
/// - Single-flight certificate refresh shared across concurrent verifications
/// - RS256 signature, issuer, audience, expiry and subject checks
/// - Unsigned token support for the Firebase Auth emulator
pub mod certificates;
pub mod client;
pub mod error;
pub mod verifier;

pub use certificates::{CertificateSet, CertificatesFetcher};
pub use client::{AuthClient, AUTH_EMULATOR_HOST_ENV};
pub use error::{AuthError, AuthResult};
pub use verifier::{TokenVerifier, TokenVerifierConfig, VerifiedClaims};
