use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::encoder::{sanitize_topic_name, EncodedPayload, MessageEncoder};
use crate::errors::{FCMError, FcmErrorCode, FcmResult};
use crate::message::{Message, MulticastMessage};
use crate::models::*;

pub const FCM_HOST: &str = "https://fcm.googleapis.com";
pub const IID_HOST: &str = "https://iid.googleapis.com";

/// Upper bound on messages per `send_all` / tokens per `send_multicast`
pub const MAX_MESSAGES_PER_BATCH: usize = 500;

/// Upper bound on registration tokens per topic management request
pub const MAX_TOKENS_PER_TOPIC_REQUEST: usize = 1000;

/// Requests in flight at once during `send_all`
const MAX_CONCURRENT_SENDS: usize = 16;

const FCM_API_FORMAT_HEADER: &str = "X-GOOG-API-FORMAT-VERSION";
const IID_AUTH_HEADER: &str = "access_token_auth";

/// Supplies OAuth2 bearer tokens for FCM requests.
///
/// Obtaining and refreshing the token (service account, metadata server,
/// workload identity) is left to the implementation.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> FcmResult<String>;
}

/// A fixed, externally managed access token
#[derive(Debug, Clone)]
pub struct StaticAccessToken(String);

impl StaticAccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenSource for StaticAccessToken {
    async fn access_token(&self) -> FcmResult<String> {
        if self.0.is_empty() {
            return Err(FCMError::TokenSource("access token is empty".to_string()));
        }
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Copy)]
enum TopicOperation {
    Subscribe,
    Unsubscribe,
}

impl TopicOperation {
    fn path(self) -> &'static str {
        match self {
            TopicOperation::Subscribe => "batchAdd",
            TopicOperation::Unsubscribe => "batchRemove",
        }
    }
}

/// Firebase Cloud Messaging Client
///
/// Sends messages through the FCM v1 HTTP API and manages topic subscriptions
/// through the instance ID service. Every message is validated and encoded
/// locally before any request is made.
pub struct FCMClient {
    project_id: String,
    token_source: Arc<dyn AccessTokenSource>,
    http_client: reqwest::Client,
    fcm_host: String,
    iid_host: String,
    encoder: MessageEncoder,
}

impl FCMClient {
    /// Create new FCM client
    ///
    /// # Arguments
    /// * `project_id` - Firebase project ID
    /// * `token_source` - Provider of OAuth2 bearer tokens
    pub fn new(project_id: impl Into<String>, token_source: Arc<dyn AccessTokenSource>) -> FcmResult<Self> {
        let project_id = project_id.into();
        if project_id.is_empty() {
            return Err(FCMError::invalid(
                "a project id is required to access the messaging service",
            ));
        }

        Ok(Self {
            project_id,
            token_source,
            http_client: reqwest::Client::new(),
            fcm_host: FCM_HOST.to_string(),
            iid_host: IID_HOST.to_string(),
            encoder: MessageEncoder::new(),
        })
    }

    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    /// Point the client at other FCM / instance ID hosts
    pub fn with_endpoints(mut self, fcm_host: impl Into<String>, iid_host: impl Into<String>) -> Self {
        self.fcm_host = fcm_host.into().trim_end_matches('/').to_string();
        self.iid_host = iid_host.into().trim_end_matches('/').to_string();
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Send a message and return the message id assigned by FCM.
    ///
    /// With `dry_run` the message is validated by the backend but not delivered.
    pub async fn send(&self, message: &Message, dry_run: bool) -> FcmResult<String> {
        let payload = self.encoder.encode(message)?;
        self.post_message(&payload, dry_run).await
    }

    /// Send up to 500 messages.
    ///
    /// Every message is encoded before the first request, so one invalid
    /// message fails the whole call without sending anything. Delivery
    /// failures after that are reported per message.
    pub async fn send_all(&self, messages: &[Message], dry_run: bool) -> FcmResult<BatchResponse> {
        if messages.is_empty() {
            return Err(FCMError::invalid("messages must be a non-empty list"));
        }
        if messages.len() > MAX_MESSAGES_PER_BATCH {
            return Err(FCMError::invalid(format!(
                "messages must not contain more than {} elements",
                MAX_MESSAGES_PER_BATCH
            )));
        }

        let payloads = messages
            .iter()
            .map(|message| self.encoder.encode(message))
            .collect::<FcmResult<Vec<EncodedPayload>>>()?;

        let results: Vec<FcmResult<String>> = stream::iter(payloads.iter())
            .map(|payload| self.post_message(payload, dry_run))
            .buffered(MAX_CONCURRENT_SENDS)
            .collect()
            .await;

        let responses: Vec<SendResponse> = results
            .into_iter()
            .map(|result| match result {
                Ok(message_id) => SendResponse::success(message_id),
                Err(e) => SendResponse::failure(e),
            })
            .collect();

        let batch = BatchResponse::new(responses);
        info!(
            "FCM batch sent: {} succeeded, {} failed (dry_run={})",
            batch.success_count(),
            batch.failure_count(),
            dry_run
        );

        Ok(batch)
    }

    /// Send one message per registration token, sharing the payload
    pub async fn send_multicast(&self, multicast: &MulticastMessage, dry_run: bool) -> FcmResult<BatchResponse> {
        if multicast.tokens.is_empty() {
            return Err(FCMError::invalid("MulticastMessage.tokens must be a non-empty list"));
        }
        if multicast.tokens.len() > MAX_MESSAGES_PER_BATCH {
            return Err(FCMError::invalid(format!(
                "MulticastMessage.tokens must not contain more than {} tokens",
                MAX_MESSAGES_PER_BATCH
            )));
        }

        self.send_all(&multicast.to_messages(), dry_run).await
    }

    /// Subscribe registration tokens to a topic
    pub async fn subscribe_to_topic(&self, tokens: &[String], topic: &str) -> FcmResult<TopicManagementResponse> {
        self.manage_topic(tokens, topic, TopicOperation::Subscribe).await
    }

    /// Unsubscribe registration tokens from a topic
    pub async fn unsubscribe_from_topic(
        &self,
        tokens: &[String],
        topic: &str,
    ) -> FcmResult<TopicManagementResponse> {
        self.manage_topic(tokens, topic, TopicOperation::Unsubscribe).await
    }

    async fn post_message(&self, payload: &EncodedPayload, dry_run: bool) -> FcmResult<String> {
        let access_token = self.token_source.access_token().await?;
        let url = format!("{}/v1/projects/{}/messages:send", self.fcm_host, self.project_id);

        debug!("Sending FCM message {} (dry_run={})", describe_target(payload), dry_run);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .header(FCM_API_FORMAT_HEADER, "2")
            .json(&SendRequest {
                validate_only: dry_run,
                message: payload,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = parse_error(status, &body);
            warn!("FCM send failed for {}: {}", describe_target(payload), err);
            return Err(err);
        }

        let sent: SendApiResponse = response
            .json()
            .await
            .map_err(|e| FCMError::UnexpectedResponse(format!("failed to parse FCM response: {}", e)))?;

        sent.name
            .ok_or_else(|| FCMError::UnexpectedResponse("FCM response is missing the message name".to_string()))
    }

    async fn manage_topic(
        &self,
        tokens: &[String],
        topic: &str,
        operation: TopicOperation,
    ) -> FcmResult<TopicManagementResponse> {
        if tokens.is_empty() {
            return Err(FCMError::invalid("tokens must be a non-empty list of strings"));
        }
        if tokens.len() > MAX_TOKENS_PER_TOPIC_REQUEST {
            return Err(FCMError::invalid(format!(
                "tokens must not contain more than {} elements",
                MAX_TOKENS_PER_TOPIC_REQUEST
            )));
        }
        if tokens.iter().any(String::is_empty) {
            return Err(FCMError::invalid("tokens must not contain empty strings"));
        }
        if topic.is_empty() {
            return Err(FCMError::invalid("topic must be a non-empty string"));
        }

        let to = sanitize_topic_name(topic, false)?;
        let access_token = self.token_source.access_token().await?;
        let url = format!("{}/iid/v1:{}", self.iid_host, operation.path());

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .header(IID_AUTH_HEADER, "true")
            .json(&TopicManagementRequest {
                to: to.clone(),
                registration_tokens: tokens,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status, &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FCMError::UnexpectedResponse(format!("failed to parse topic management response: {}", e)))?;
        let result = TopicManagementResponse::from_body(&body)?;

        info!(
            "Topic {} {}: {} succeeded, {} failed",
            operation.path(),
            to,
            result.success_count,
            result.failure_count
        );

        Ok(result)
    }
}

/// Map a non-2xx response to an error, using the FCM error code when present
fn parse_error(status: StatusCode, body: &str) -> FCMError {
    let parsed: PlatformErrorResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) => {
            return FCMError::UnexpectedResponse(format!(
                "HTTP response is not json (status {}): {}",
                status.as_u16(),
                body
            ))
        }
    };

    let message = match (parsed.error.message.clone(), parsed.error.status.as_deref()) {
        (Some(message), _) => message,
        (None, Some(platform_status)) => format!(
            "Unexpected HTTP response with status {} ({})",
            status.as_u16(),
            platform_status
        ),
        (None, None) => format!(
            "Unexpected HTTP response with status {}; body: {}",
            status.as_u16(),
            body
        ),
    };

    FCMError::Api {
        code: parsed.error.fcm_error_code().unwrap_or(FcmErrorCode::Unspecified),
        message,
        status: status.as_u16(),
    }
}

/// Log-safe description of a message target; registration tokens are truncated
fn describe_target(payload: &EncodedPayload) -> String {
    if let Some(token) = payload.get("token").and_then(Value::as_str) {
        let prefix: String = token.chars().take(8).collect();
        format!("token {}...", prefix)
    } else if let Some(topic) = payload.get("topic").and_then(Value::as_str) {
        format!("topic {}", topic)
    } else {
        "condition".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Notification;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SEND_PATH: &str = "/v1/projects/test-project/messages:send";

    fn client_for(server: &MockServer) -> FCMClient {
        FCMClient::new("test-project", Arc::new(StaticAccessToken::new("test-token")))
            .unwrap()
            .with_endpoints(server.uri(), server.uri())
    }

    fn tokens(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("token-{}", i)).collect()
    }

    #[test]
    fn test_fcm_client_creation() {
        let client = FCMClient::new("test-project", Arc::new(StaticAccessToken::new("t"))).unwrap();
        assert_eq!(client.project_id(), "test-project");

        assert!(matches!(
            FCMClient::new("", Arc::new(StaticAccessToken::new("t"))),
            Err(FCMError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_describe_target_truncates_tokens() {
        let payload = MessageEncoder::new()
            .encode(&Message::to_token("abcdefghijklmnop"))
            .unwrap();
        assert_eq!(describe_target(&payload), "token abcdefgh...");

        let payload = MessageEncoder::new().encode(&Message::to_topic("news")).unwrap();
        assert_eq!(describe_target(&payload), "topic news");
    }

    #[tokio::test]
    async fn test_send_returns_message_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .and(header("authorization", "Bearer test-token"))
            .and(header("x-goog-api-format-version", "2"))
            .and(body_json(json!({
                "validate_only": false,
                "message": {
                    "token": "device-token",
                    "notification": { "title": "Hello", "body": "World" }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/test-project/messages/1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let message = Message::to_token("device-token").with_notification(Notification::new("Hello", "World"));
        let name = client_for(&server).send(&message, false).await.unwrap();

        assert_eq!(name, "projects/test-project/messages/1");
    }

    #[tokio::test]
    async fn test_dry_run_sets_validate_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .and(body_partial_json(json!({ "validate_only": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/test-project/messages/fake_message_id"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let name = client_for(&server)
            .send(&Message::to_topic("/topics/news"), true)
            .await
            .unwrap();

        assert_eq!(name, "projects/test-project/messages/fake_message_id");
    }

    #[tokio::test]
    async fn test_invalid_message_is_never_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server).send(&Message::default(), false).await.unwrap_err();

        assert!(matches!(err, FCMError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_send_maps_fcm_error_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {
                    "code": 404,
                    "message": "Requested entity was not found.",
                    "status": "NOT_FOUND",
                    "details": [{
                        "@type": "type.googleapis.com/google.firebase.fcm.v1.FcmError",
                        "errorCode": "UNREGISTERED"
                    }]
                }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .send(&Message::to_token("stale-token"), false)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            FCMError::Api {
                code: FcmErrorCode::Unregistered,
                message: "Requested entity was not found.".to_string(),
                status: 404,
            }
        );
    }

    #[tokio::test]
    async fn test_send_error_without_details_is_unspecified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": { "message": "Internal error", "status": "INTERNAL" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .send(&Message::to_token("t"), false)
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some(FcmErrorCode::Unspecified));
    }

    #[tokio::test]
    async fn test_send_error_without_message_reports_platform_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "error": { "status": "UNAVAILABLE" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .send(&Message::to_token("t"), false)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            FCMError::Api {
                code: FcmErrorCode::Unspecified,
                message: "Unexpected HTTP response with status 503 (UNAVAILABLE)".to_string(),
                status: 503,
            }
        );
    }

    #[tokio::test]
    async fn test_send_error_with_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .send(&Message::to_token("t"), false)
            .await
            .unwrap_err();

        assert!(matches!(err, FCMError::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn test_send_all_reports_each_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .and(body_partial_json(json!({ "message": { "token": "bad" } })))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "message": "The registration token is not a valid FCM registration token",
                    "details": [{
                        "@type": "type.googleapis.com/google.firebase.fcm.v1.FcmError",
                        "errorCode": "INVALID_ARGUMENT"
                    }]
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/test-project/messages/ok"
            })))
            .mount(&server)
            .await;

        let messages = vec![
            Message::to_token("good-1"),
            Message::to_token("bad"),
            Message::to_token("good-2"),
        ];
        let batch = client_for(&server).send_all(&messages, false).await.unwrap();

        assert_eq!(batch.success_count(), 2);
        assert_eq!(batch.failure_count(), 1);
        assert!(batch.responses[0].is_success());
        assert_eq!(
            batch.responses[1].error.as_ref().and_then(FCMError::code),
            Some(FcmErrorCode::InvalidArgument)
        );
        assert!(batch.responses[2].is_success());
    }

    #[tokio::test]
    async fn test_send_all_keeps_request_order_beyond_concurrency_limit() {
        let server = MockServer::start().await;
        let count = MAX_CONCURRENT_SENDS * 2 + 3;
        for i in 0..count {
            Mock::given(method("POST"))
                .and(path(SEND_PATH))
                .and(body_partial_json(json!({ "message": { "token": format!("token-{}", i) } })))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "name": format!("projects/test-project/messages/{}", i)
                })))
                .expect(1)
                .mount(&server)
                .await;
        }

        let messages: Vec<Message> = tokens(count).iter().map(|t| Message::to_token(t.as_str())).collect();
        let batch = client_for(&server).send_all(&messages, false).await.unwrap();

        assert_eq!(batch.success_count(), count);
        for (i, response) in batch.responses.iter().enumerate() {
            assert_eq!(
                response.message_id.as_deref(),
                Some(format!("projects/test-project/messages/{}", i).as_str())
            );
        }
    }

    #[tokio::test]
    async fn test_send_all_validates_batch_before_sending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let client = client_for(&server);

        assert!(client.send_all(&[], false).await.is_err());

        let too_many: Vec<Message> = tokens(501).into_iter().map(Message::to_token).collect();
        assert!(client.send_all(&too_many, false).await.is_err());

        let one_invalid = vec![Message::to_token("ok"), Message::to_topic("bad topic!")];
        assert!(matches!(
            client.send_all(&one_invalid, false).await,
            Err(FCMError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_send_multicast_sends_one_request_per_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SEND_PATH))
            .and(body_partial_json(json!({ "message": { "notification": { "title": "Hi" } } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/test-project/messages/m"
            })))
            .expect(3)
            .mount(&server)
            .await;

        let mut multicast = MulticastMessage::new(tokens(3));
        multicast.notification = Some(Notification::new("Hi", "there"));

        let batch = client_for(&server).send_multicast(&multicast, false).await.unwrap();

        assert_eq!(batch.responses.len(), 3);
        assert_eq!(batch.success_count(), 3);
    }

    #[tokio::test]
    async fn test_send_multicast_rejects_empty_tokens() {
        let server = MockServer::start().await;
        let err = client_for(&server)
            .send_multicast(&MulticastMessage::new(vec![]), false)
            .await
            .unwrap_err();

        assert!(matches!(err, FCMError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_subscribe_to_topic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/iid/v1:batchAdd"))
            .and(header("access_token_auth", "true"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_json(json!({
                "to": "/topics/news",
                "registration_tokens": ["token-0", "token-1"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{}, { "error": "NOT_FOUND" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server)
            .subscribe_to_topic(&tokens(2), "news")
            .await
            .unwrap();

        assert_eq!(response.success_count, 1);
        assert_eq!(response.failure_count, 1);
        assert_eq!(
            response.errors,
            vec![ErrorInfo {
                index: 1,
                reason: "NOT_FOUND".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_from_topic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/iid/v1:batchRemove"))
            .and(body_partial_json(json!({ "to": "/topics/news" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [{}] })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server)
            .unsubscribe_from_topic(&tokens(1), "/topics/news")
            .await
            .unwrap();

        assert_eq!(response.success_count, 1);
        assert!(response.errors.is_empty());
    }

    #[tokio::test]
    async fn test_topic_management_validates_arguments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let client = client_for(&server);

        assert!(client.subscribe_to_topic(&[], "news").await.is_err());
        assert!(client.subscribe_to_topic(&tokens(1001), "news").await.is_err());
        assert!(client.subscribe_to_topic(&[String::new()], "news").await.is_err());
        assert!(client.subscribe_to_topic(&tokens(1), "").await.is_err());
        assert!(client.subscribe_to_topic(&tokens(1), "bad topic!").await.is_err());
    }

    #[tokio::test]
    async fn test_topic_management_unexpected_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/iid/v1:batchAdd"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .subscribe_to_topic(&tokens(1), "news")
            .await
            .unwrap_err();

        assert!(matches!(err, FCMError::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn test_empty_access_token_fails_before_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = FCMClient::new("test-project", Arc::new(StaticAccessToken::new("")))
            .unwrap()
            .with_endpoints(server.uri(), server.uri());
        let err = client.send(&Message::to_token("t"), false).await.unwrap_err();

        assert!(matches!(err, FCMError::TokenSource(_)));
    }
}
