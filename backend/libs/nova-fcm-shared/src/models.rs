use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::encoder::EncodedPayload;
use crate::errors::{FCMError, FcmErrorCode, FcmResult};

/// Outcome of one message within a batch send
#[derive(Debug, Clone, PartialEq)]
pub struct SendResponse {
    pub message_id: Option<String>,
    pub error: Option<FCMError>,
}

impl SendResponse {
    pub fn success(message_id: String) -> Self {
        Self {
            message_id: Some(message_id),
            error: None,
        }
    }

    pub fn failure(error: FCMError) -> Self {
        Self {
            message_id: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.message_id.is_some()
    }
}

/// Per-message outcomes of `send_all` / `send_multicast`, in request order
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResponse {
    pub responses: Vec<SendResponse>,
}

impl BatchResponse {
    pub fn new(responses: Vec<SendResponse>) -> Self {
        Self { responses }
    }

    pub fn success_count(&self) -> usize {
        self.responses.iter().filter(|r| r.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.responses.len() - self.success_count()
    }
}

/// A failed registration token within a topic management request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Position of the token in the request
    pub index: usize,
    pub reason: String,
}

/// Result of a subscribe / unsubscribe call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicManagementResponse {
    pub success_count: usize,
    pub failure_count: usize,
    pub errors: Vec<ErrorInfo>,
}

impl TopicManagementResponse {
    /// Build from the instance ID service's `{"results": [...]}` body
    pub fn from_body(body: &Value) -> FcmResult<Self> {
        let results = body
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| FCMError::UnexpectedResponse("Unexpected topic management response".to_string()))?;

        let errors: Vec<ErrorInfo> = results
            .iter()
            .enumerate()
            .filter_map(|(index, result)| {
                result.get("error").and_then(Value::as_str).map(|reason| ErrorInfo {
                    index,
                    reason: reason.to_string(),
                })
            })
            .collect();

        Ok(Self {
            success_count: results.len() - errors.len(),
            failure_count: errors.len(),
            errors,
        })
    }
}

/// FCM send request body
#[derive(Debug, Serialize)]
pub(crate) struct SendRequest<'a> {
    pub validate_only: bool,
    pub message: &'a EncodedPayload,
}

/// FCM send response body
#[derive(Debug, Deserialize)]
pub(crate) struct SendApiResponse {
    pub name: Option<String>,
}

/// Instance ID batchAdd / batchRemove request body
#[derive(Debug, Serialize)]
pub(crate) struct TopicManagementRequest<'a> {
    pub to: String,
    pub registration_tokens: &'a [String],
}

/// Google API error envelope: `{"error": {"message", "status", "details"}}`
#[derive(Debug, Default, Deserialize)]
pub(crate) struct PlatformErrorResponse {
    #[serde(default)]
    pub error: PlatformError,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PlatformError {
    pub message: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub details: Vec<Value>,
}

const FCM_ERROR_TYPE: &str = "type.googleapis.com/google.firebase.fcm.v1.FcmError";

impl PlatformError {
    /// The `errorCode` of the first FCM error detail, if any
    pub fn fcm_error_code(&self) -> Option<FcmErrorCode> {
        self.details
            .iter()
            .find(|detail| detail.get("@type").and_then(Value::as_str) == Some(FCM_ERROR_TYPE))
            .map(|detail| {
                let code = detail.get("errorCode").and_then(Value::as_str).unwrap_or_default();
                FcmErrorCode::from_code(code)
            })
    }
}
