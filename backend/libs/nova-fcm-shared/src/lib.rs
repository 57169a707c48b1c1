/// Nova FCM Shared Library
///
/// This library provides a Firebase Cloud Messaging (FCM) client for sending
/// push notifications to Android, Apple and Web devices.
///
/// It handles:
/// - A typed message model covering the FCM v1 `Message` resource
/// - Local validation and wire encoding of messages before any network call
/// - Single, batch and multicast message delivery
/// - Topic subscription management
/// - Classification of FCM error responses

pub mod client;
pub mod encoder;
pub mod errors;
pub mod message;
pub mod models;
mod validation;

pub use client::{AccessTokenSource, FCMClient, StaticAccessToken};
pub use encoder::{sanitize_topic_name, EncodedPayload, MessageEncoder};
pub use errors::{FCMError, FcmErrorCode, FcmResult};
pub use message::{
    Alert, AndroidConfig, AndroidFcmOptions, AndroidNotification, ApnsConfig, ApnsFcmOptions, ApnsPayload, Aps,
    ApsAlert, CriticalSound, FcmOptions, LightSettings, Message, MulticastMessage, Notification, Sound,
};
pub use models::{BatchResponse, ErrorInfo, SendResponse, TopicManagementResponse};
pub use validation::to_seconds_string;
