//! FCM message model
//!
//! Plain data records mirroring the FCM v1 `Message` resource. Nothing here is
//! validated on construction; [`crate::encoder::MessageEncoder`] checks the
//! whole tree when it is turned into a wire payload.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A message that can be sent via Firebase Cloud Messaging.
///
/// Exactly one of `token`, `topic` or `condition` must be set by the time the
/// message is encoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Data fields. All keys and values are strings
    pub data: Option<HashMap<String, String>>,
    pub notification: Option<Notification>,
    pub android: Option<AndroidConfig>,
    pub apns: Option<ApnsConfig>,
    pub fcm_options: Option<FcmOptions>,
    /// Registration token of the target device
    pub token: Option<String>,
    /// Topic name, with or without the `/topics/` prefix
    pub topic: Option<String>,
    /// Condition expression, e.g. `'foo' in topics && 'bar' in topics`
    pub condition: Option<String>,
}

impl Message {
    pub fn to_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn to_topic(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            ..Default::default()
        }
    }

    pub fn to_condition(condition: impl Into<String>) -> Self {
        Self {
            condition: Some(condition.into()),
            ..Default::default()
        }
    }

    pub fn with_notification(mut self, notification: Notification) -> Self {
        self.notification = Some(notification);
        self
    }

    pub fn with_data(mut self, data: HashMap<String, String>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_android(mut self, android: AndroidConfig) -> Self {
        self.android = Some(android);
        self
    }

    pub fn with_apns(mut self, apns: ApnsConfig) -> Self {
        self.apns = Some(apns);
        self
    }

    pub fn with_fcm_options(mut self, fcm_options: FcmOptions) -> Self {
        self.fcm_options = Some(fcm_options);
        self
    }
}

/// A message addressed to many registration tokens at once
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MulticastMessage {
    pub tokens: Vec<String>,
    pub data: Option<HashMap<String, String>>,
    pub notification: Option<Notification>,
    pub android: Option<AndroidConfig>,
    pub apns: Option<ApnsConfig>,
    pub fcm_options: Option<FcmOptions>,
}

impl MulticastMessage {
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens,
            ..Default::default()
        }
    }

    /// One [`Message`] per token, each carrying a copy of the shared payload
    pub fn into_messages(self) -> Vec<Message> {
        self.to_messages()
    }

    pub fn to_messages(&self) -> Vec<Message> {
        self.tokens
            .iter()
            .map(|token| Message {
                token: Some(token.clone()),
                data: self.data.clone(),
                notification: self.notification.clone(),
                android: self.android.clone(),
                apns: self.apns.clone(),
                fcm_options: self.fcm_options.clone(),
                ..Default::default()
            })
            .collect()
    }
}

/// Basic notification shown on every platform
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notification {
    pub title: Option<String>,
    pub body: Option<String>,
    /// URL of an image to show in the notification
    pub image: Option<String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            body: Some(body.into()),
            image: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FcmOptions {
    pub analytics_label: Option<String>,
}

/// Android specific options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AndroidConfig {
    /// Identifier of a group of messages that can be collapsed
    pub collapse_key: Option<String>,
    /// `"normal"` or `"high"`
    pub priority: Option<String>,
    /// Time-to-live in seconds
    pub ttl: Option<f64>,
    pub restricted_package_name: Option<String>,
    /// Overrides the top-level message data when set
    pub data: Option<HashMap<String, String>>,
    pub notification: Option<AndroidNotification>,
    pub fcm_options: Option<AndroidFcmOptions>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AndroidFcmOptions {
    pub analytics_label: Option<String>,
}

/// Android notification options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AndroidNotification {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
    /// Icon color in `#RRGGBB` or `#RRGGBBAA` form
    pub color: Option<String>,
    pub sound: Option<String>,
    pub tag: Option<String>,
    pub image: Option<String>,
    pub click_action: Option<String>,
    pub body_loc_key: Option<String>,
    /// Requires `body_loc_key`
    pub body_loc_args: Option<Vec<String>>,
    pub title_loc_key: Option<String>,
    /// Requires `title_loc_key`
    pub title_loc_args: Option<Vec<String>>,
    pub channel_id: Option<String>,
    pub ticker: Option<String>,
    pub sticky: Option<bool>,
    pub event_time: Option<DateTime<Utc>>,
    pub local_only: Option<bool>,
    /// One of `min`, `low`, `default`, `high`, `max`
    pub priority: Option<String>,
    /// Vibration pattern, each entry in seconds
    pub vibrate_timings: Option<Vec<f64>>,
    pub default_vibrate_timings: Option<bool>,
    pub default_sound: Option<bool>,
    pub light_settings: Option<LightSettings>,
    pub default_light_settings: Option<bool>,
    /// One of `private`, `public`, `secret`
    pub visibility: Option<String>,
    pub notification_count: Option<i64>,
}

/// LED settings of an Android notification
#[derive(Debug, Clone, PartialEq)]
pub struct LightSettings {
    /// `#RRGGBB` or `#RRGGBBAA`
    pub color: String,
    /// Seconds the LED stays on per blink
    pub light_on_duration: f64,
    /// Seconds the LED stays off per blink
    pub light_off_duration: f64,
}

/// APNs specific options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApnsConfig {
    /// APNs request headers, e.g. `apns-priority`
    pub headers: Option<HashMap<String, String>>,
    pub payload: Option<ApnsPayload>,
    pub fcm_options: Option<ApnsFcmOptions>,
}

/// The APNs payload: an `aps` dictionary plus arbitrary top-level keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApnsPayload {
    pub aps: Aps,
    pub custom_data: Option<Map<String, Value>>,
}

impl ApnsPayload {
    pub fn new(aps: Aps) -> Self {
        Self {
            aps,
            custom_data: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApnsFcmOptions {
    pub analytics_label: Option<String>,
    pub image: Option<String>,
}

/// The `aps` dictionary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aps {
    pub alert: Option<Alert>,
    /// Badge count; 0 clears the badge
    pub badge: Option<i64>,
    pub sound: Option<Sound>,
    pub content_available: Option<bool>,
    pub mutable_content: Option<bool>,
    pub category: Option<String>,
    pub thread_id: Option<String>,
    /// Extra keys merged into `aps`; must not repeat a key already set
    pub custom_data: Option<Map<String, Value>>,
}

/// `aps.alert`: either a plain string or an alert dictionary
#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    Text(String),
    Dictionary(ApsAlert),
}

impl From<&str> for Alert {
    fn from(text: &str) -> Self {
        Alert::Text(text.to_string())
    }
}

impl From<String> for Alert {
    fn from(text: String) -> Self {
        Alert::Text(text)
    }
}

impl From<ApsAlert> for Alert {
    fn from(alert: ApsAlert) -> Self {
        Alert::Dictionary(alert)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApsAlert {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub body: Option<String>,
    pub loc_key: Option<String>,
    pub loc_args: Option<Vec<String>>,
    pub title_loc_key: Option<String>,
    pub title_loc_args: Option<Vec<String>>,
    pub subtitle_loc_key: Option<String>,
    pub subtitle_loc_args: Option<Vec<String>>,
    pub action_loc_key: Option<String>,
    pub launch_image: Option<String>,
    pub custom_data: Option<Map<String, Value>>,
}

/// `aps.sound`: a sound file name or a critical alert sound
#[derive(Debug, Clone, PartialEq)]
pub enum Sound {
    Name(String),
    Critical(CriticalSound),
}

impl From<&str> for Sound {
    fn from(name: &str) -> Self {
        Sound::Name(name.to_string())
    }
}

impl From<CriticalSound> for Sound {
    fn from(sound: CriticalSound) -> Self {
        Sound::Critical(sound)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CriticalSound {
    /// Sound file name, or `"default"` for the system sound
    pub name: String,
    pub critical: Option<bool>,
    /// Between 0.0 (silent) and 1.0 (full volume)
    pub volume: Option<f64>,
}

impl CriticalSound {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            critical: None,
            volume: None,
        }
    }
}

impl Default for CriticalSound {
    fn default() -> Self {
        Self::new("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multicast_expands_to_one_message_per_token() {
        let mut multicast = MulticastMessage::new(vec!["a".to_string(), "b".to_string()]);
        multicast.notification = Some(Notification::new("title", "body"));

        let messages = multicast.to_messages();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].token.as_deref(), Some("a"));
        assert_eq!(messages[1].token.as_deref(), Some("b"));
        assert!(messages.iter().all(|m| m.notification == multicast.notification));
        assert!(messages.iter().all(|m| m.topic.is_none() && m.condition.is_none()));
    }

    #[test]
    fn test_critical_sound_defaults_to_system_sound() {
        assert_eq!(CriticalSound::default().name, "default");
    }
}
