use std::fmt;
use thiserror::Error;

/// Error codes reported by the FCM backend in `FcmError` detail entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcmErrorCode {
    /// APNs certificate or web push auth key was invalid or missing
    ThirdPartyAuth,
    InvalidArgument,
    QuotaExceeded,
    SenderIdMismatch,
    /// The registration token is no longer valid
    Unregistered,
    Unspecified,
}

impl FcmErrorCode {
    pub fn from_code(code: &str) -> Self {
        match code {
            "APNS_AUTH_ERROR" | "THIRD_PARTY_AUTH_ERROR" => Self::ThirdPartyAuth,
            "INVALID_ARGUMENT" => Self::InvalidArgument,
            "QUOTA_EXCEEDED" => Self::QuotaExceeded,
            "SENDER_ID_MISMATCH" => Self::SenderIdMismatch,
            "UNREGISTERED" => Self::Unregistered,
            _ => Self::Unspecified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ThirdPartyAuth => "THIRD_PARTY_AUTH_ERROR",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::SenderIdMismatch => "SENDER_ID_MISMATCH",
            Self::Unregistered => "UNREGISTERED",
            Self::Unspecified => "UNSPECIFIED_ERROR",
        }
    }
}

impl fmt::Display for FcmErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// FCM Client Error Types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FCMError {
    /// The message or request arguments failed validation; nothing was sent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("FCM request failed: {0}")]
    Http(String),

    #[error("FCM API error ({code}, status {status}): {message}")]
    Api {
        code: FcmErrorCode,
        message: String,
        status: u16,
    },

    #[error("Unexpected FCM response: {0}")]
    UnexpectedResponse(String),

    #[error("Failed to get access token: {0}")]
    TokenSource(String),
}

impl FCMError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        FCMError::InvalidArgument(message.into())
    }

    /// The FCM error code, when the server reported one
    pub fn code(&self) -> Option<FcmErrorCode> {
        match self {
            FCMError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_unregistered(&self) -> bool {
        self.code() == Some(FcmErrorCode::Unregistered)
    }
}

impl From<reqwest::Error> for FCMError {
    fn from(err: reqwest::Error) -> Self {
        FCMError::Http(err.to_string())
    }
}

pub type FcmResult<T> = Result<T, FCMError>;
