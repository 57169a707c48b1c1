//! Message encoder
//!
//! Validates a [`Message`] tree field by field and converts it into the JSON
//! object the FCM v1 `messages:send` endpoint expects. Encoding is pure: it
//! never touches the network, and it either returns the whole payload or an
//! [`FCMError::InvalidArgument`] describing the first offending field.
//!
//! Absent fields, empty string maps and empty arrays never reach the wire.

use chrono::SecondsFormat;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::errors::{FCMError, FcmResult};
use crate::message::{
    Alert, AndroidConfig, AndroidFcmOptions, AndroidNotification, ApnsConfig, ApnsFcmOptions, ApnsPayload, Aps,
    ApsAlert, CriticalSound, FcmOptions, LightSettings, Message, Notification, Sound,
};
use crate::validation::{
    check_analytics_label, check_color, check_string, check_string_array, check_string_map, encode_color,
    encode_duration,
};

/// Wire representation of a message: field name → JSON value
pub type EncodedPayload = Map<String, Value>;

const TOPIC_PREFIX: &str = "/topics/";

static TOPIC_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\-_.~%]+$").expect("topic pattern is valid"));

const ANDROID_PRIORITIES: [&str; 2] = ["normal", "high"];
const NOTIFICATION_PRIORITIES: [&str; 5] = ["min", "low", "default", "high", "max"];
const VISIBILITIES: [&str; 3] = ["private", "public", "secret"];
/// APS fields that custom data may never reuse, set or not
const APS_RESERVED_KEYS: [&str; 5] = ["alert", "badge", "sound", "category", "thread-id"];

/// Normalize a topic name.
///
/// A leading `/topics/` is removed before validation. With `strip_prefix` the
/// bare name is returned (what `messages:send` expects); without it the prefix
/// is put back (what the topic management endpoints expect).
pub fn sanitize_topic_name(topic: &str, strip_prefix: bool) -> FcmResult<String> {
    let name = topic.strip_prefix(TOPIC_PREFIX).unwrap_or(topic);

    if !TOPIC_PATTERN.is_match(name) {
        return Err(FCMError::invalid("Malformed topic name."));
    }

    if strip_prefix {
        Ok(name.to_string())
    } else {
        Ok(format!("{}{}", TOPIC_PREFIX, name))
    }
}

/// JSON object under construction; drops nulls and empty collections
#[derive(Debug, Default)]
struct WireObject(Map<String, Value>);

impl WireObject {
    fn new() -> Self {
        Self::default()
    }

    fn put<V: Into<Value>>(&mut self, key: &str, value: Option<V>) {
        if let Some(value) = value {
            self.put_value(key.to_string(), value.into());
        }
    }

    fn put_value(&mut self, key: String, value: Value) {
        let empty = match &value {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        };
        if !empty {
            self.0.insert(key, value);
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    fn into_map(self) -> Map<String, Value> {
        self.0
    }

    fn into_non_empty(self) -> Option<Map<String, Value>> {
        Some(self.0).filter(|map| !map.is_empty())
    }
}

fn string_map(map: &HashMap<String, String>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect()
}

fn string_array(items: &[String]) -> Value {
    Value::from(items)
}

/// Encodes [`Message`] trees into FCM wire payloads
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageEncoder;

impl MessageEncoder {
    pub fn new() -> Self {
        Self
    }

    pub fn encode(&self, message: &Message) -> FcmResult<EncodedPayload> {
        let condition = check_string("Message.condition", message.condition.as_deref(), true)?;
        let token = check_string("Message.token", message.token.as_deref(), true)?;
        let topic = check_string("Message.topic", message.topic.as_deref(), true)?
            .map(|topic| sanitize_topic_name(topic, true))
            .transpose()?;

        let mut result = WireObject::new();
        result.put("android", self.encode_android(message.android.as_ref())?);
        result.put("apns", self.encode_apns(message.apns.as_ref())?);
        result.put("condition", condition);
        result.put("data", check_string_map(message.data.as_ref()).map(string_map));
        result.put("notification", self.encode_notification(message.notification.as_ref()));
        result.put("token", token);
        result.put("topic", topic);
        result.put("fcm_options", self.encode_fcm_options(message.fcm_options.as_ref())?);

        let targets = ["token", "topic", "condition"]
            .iter()
            .filter(|key| result.contains(key))
            .count();
        if targets != 1 {
            return Err(FCMError::invalid(
                "Exactly one token, topic or condition must be specified",
            ));
        }

        Ok(result.into_map())
    }

    fn encode_android(&self, config: Option<&AndroidConfig>) -> FcmResult<Option<Map<String, Value>>> {
        let Some(config) = config else {
            return Ok(None);
        };

        let priority = check_string("AndroidConfig.priority", config.priority.as_deref(), true)?;
        if let Some(priority) = priority {
            if !ANDROID_PRIORITIES.contains(&priority) {
                return Err(FCMError::invalid("AndroidConfig.priority must be 'normal' or 'high'"));
            }
        }

        let ttl = config
            .ttl
            .map(|ttl| encode_duration("AndroidConfig.ttl", ttl))
            .transpose()?;

        let mut result = WireObject::new();
        result.put("collapse_key", config.collapse_key.as_deref());
        result.put("data", check_string_map(config.data.as_ref()).map(string_map));
        result.put(
            "notification",
            self.encode_android_notification(config.notification.as_ref())?,
        );
        result.put("priority", priority);
        result.put("restricted_package_name", config.restricted_package_name.as_deref());
        result.put("ttl", ttl);
        result.put(
            "fcm_options",
            self.encode_android_fcm_options(config.fcm_options.as_ref())?,
        );
        Ok(result.into_non_empty())
    }

    fn encode_android_notification(
        &self,
        notification: Option<&AndroidNotification>,
    ) -> FcmResult<Option<Map<String, Value>>> {
        let Some(n) = notification else {
            return Ok(None);
        };

        let body_loc_key = n.body_loc_key.as_deref();
        let body_loc_args = check_string_array(n.body_loc_args.as_deref());
        let title_loc_key = n.title_loc_key.as_deref();
        let title_loc_args = check_string_array(n.title_loc_args.as_deref());

        if body_loc_args.is_some() && body_loc_key.is_none() {
            return Err(FCMError::invalid(
                "AndroidNotification.body_loc_key is required when specifying body_loc_args",
            ));
        }
        if title_loc_args.is_some() && title_loc_key.is_none() {
            return Err(FCMError::invalid(
                "AndroidNotification.title_loc_key is required when specifying title_loc_args",
            ));
        }

        let color = check_color("AndroidNotification.color", n.color.as_deref(), true, false)?;

        let priority = check_string("AndroidNotification.priority", n.priority.as_deref(), true)?
            .map(|priority| {
                if NOTIFICATION_PRIORITIES.contains(&priority) {
                    Ok(format!("PRIORITY_{}", priority.to_uppercase()))
                } else {
                    Err(FCMError::invalid(
                        "AndroidNotification.priority must be 'default', 'min', 'low', 'high' or 'max'.",
                    ))
                }
            })
            .transpose()?;

        let visibility = check_string("AndroidNotification.visibility", n.visibility.as_deref(), true)?
            .map(|visibility| {
                if VISIBILITIES.contains(&visibility) {
                    Ok(visibility.to_uppercase())
                } else {
                    Err(FCMError::invalid(
                        "AndroidNotification.visibility must be 'private', 'public' or 'secret'",
                    ))
                }
            })
            .transpose()?;

        let vibrate_timings = n
            .vibrate_timings
            .as_deref()
            .filter(|timings| !timings.is_empty())
            .map(|timings| {
                timings
                    .iter()
                    .map(|t| encode_duration("AndroidNotification.vibrate_timings", *t))
                    .collect::<FcmResult<Vec<String>>>()
            })
            .transpose()?;

        let event_time = n.event_time.map(|time| {
            // RFC 3339 with microsecond precision and a literal Z
            time.to_rfc3339_opts(SecondsFormat::Micros, true)
        });

        let mut result = WireObject::new();
        result.put("body", n.body.as_deref());
        result.put("body_loc_key", body_loc_key);
        result.put("body_loc_args", body_loc_args.map(string_array));
        result.put("click_action", n.click_action.as_deref());
        result.put("color", color);
        result.put("icon", n.icon.as_deref());
        result.put("sound", n.sound.as_deref());
        result.put("tag", n.tag.as_deref());
        result.put("title", n.title.as_deref());
        result.put("title_loc_key", title_loc_key);
        result.put("title_loc_args", title_loc_args.map(string_array));
        result.put("channel_id", n.channel_id.as_deref());
        result.put("image", n.image.as_deref());
        result.put("ticker", n.ticker.as_deref());
        result.put("sticky", n.sticky);
        result.put("event_time", event_time);
        result.put("local_only", n.local_only);
        result.put("notification_priority", priority);
        result.put("vibrate_timings", vibrate_timings);
        result.put("default_vibrate_timings", n.default_vibrate_timings);
        result.put("default_sound", n.default_sound);
        result.put("default_light_settings", n.default_light_settings);
        result.put(
            "light_settings",
            self.encode_light_settings(n.light_settings.as_ref())?,
        );
        result.put("visibility", visibility);
        result.put("notification_count", n.notification_count);
        Ok(result.into_non_empty())
    }

    fn encode_light_settings(&self, settings: Option<&LightSettings>) -> FcmResult<Option<Map<String, Value>>> {
        let Some(settings) = settings else {
            return Ok(None);
        };

        let color = encode_color("LightSettings.color", &settings.color, true)?;
        let mut color_object = WireObject::new();
        color_object.put("red", Some(color.red));
        color_object.put("green", Some(color.green));
        color_object.put("blue", Some(color.blue));
        color_object.put("alpha", Some(color.alpha));

        let mut result = WireObject::new();
        result.put("color", Some(color_object.into_map()));
        result.put(
            "light_on_duration",
            Some(encode_duration("LightSettings.light_on_duration", settings.light_on_duration)?),
        );
        result.put(
            "light_off_duration",
            Some(encode_duration("LightSettings.light_off_duration", settings.light_off_duration)?),
        );
        Ok(Some(result.into_map()))
    }

    fn encode_android_fcm_options(
        &self,
        options: Option<&AndroidFcmOptions>,
    ) -> FcmResult<Option<Map<String, Value>>> {
        let Some(options) = options else {
            return Ok(None);
        };

        let mut result = WireObject::new();
        result.put(
            "analytics_label",
            check_analytics_label("AndroidFCMOptions.analytics_label", options.analytics_label.as_deref())?,
        );
        Ok(result.into_non_empty())
    }

    fn encode_apns(&self, config: Option<&ApnsConfig>) -> FcmResult<Option<Map<String, Value>>> {
        let Some(config) = config else {
            return Ok(None);
        };

        let mut result = WireObject::new();
        result.put("headers", check_string_map(config.headers.as_ref()).map(string_map));
        result.put("payload", self.encode_apns_payload(config.payload.as_ref())?);
        result.put("fcm_options", self.encode_apns_fcm_options(config.fcm_options.as_ref())?);
        Ok(result.into_non_empty())
    }

    fn encode_apns_payload(&self, payload: Option<&ApnsPayload>) -> FcmResult<Option<Map<String, Value>>> {
        let Some(payload) = payload else {
            return Ok(None);
        };

        let mut result = WireObject::new();
        result.put("aps", Some(self.encode_aps(&payload.aps)?));
        // Top-level custom keys overwrite silently, including `aps`
        if let Some(custom_data) = &payload.custom_data {
            for (key, value) in custom_data {
                result.0.remove(key);
                result.put_value(key.clone(), value.clone());
            }
        }
        Ok(result.into_non_empty())
    }

    fn encode_apns_fcm_options(&self, options: Option<&ApnsFcmOptions>) -> FcmResult<Option<Map<String, Value>>> {
        let Some(options) = options else {
            return Ok(None);
        };

        let mut result = WireObject::new();
        result.put(
            "analytics_label",
            check_analytics_label("APNSFCMOptions.analytics_label", options.analytics_label.as_deref())?,
        );
        result.put("image", options.image.as_deref());
        Ok(result.into_non_empty())
    }

    fn encode_aps(&self, aps: &Aps) -> FcmResult<Map<String, Value>> {
        let mut result = WireObject::new();
        result.put("alert", self.encode_aps_alert(aps.alert.as_ref())?);
        result.put("badge", aps.badge);
        result.put("sound", self.encode_aps_sound(aps.sound.as_ref())?);
        result.put("category", aps.category.as_deref());
        result.put("thread-id", aps.thread_id.as_deref());
        if aps.content_available == Some(true) {
            result.put("content-available", Some(1));
        }
        if aps.mutable_content == Some(true) {
            result.put("mutable-content", Some(1));
        }

        if let Some(custom_data) = &aps.custom_data {
            for (key, value) in custom_data {
                if APS_RESERVED_KEYS.contains(&key.as_str()) || result.contains(key) {
                    return Err(FCMError::invalid(format!("Multiple specifications for {} in APS", key)));
                }
                result.put_value(key.clone(), value.clone());
            }
        }

        Ok(result.into_map())
    }

    fn encode_aps_alert(&self, alert: Option<&Alert>) -> FcmResult<Option<Value>> {
        let alert = match alert {
            None => return Ok(None),
            Some(Alert::Text(text)) => return Ok(Some(Value::String(text.clone()))),
            Some(Alert::Dictionary(alert)) => alert,
        };

        let ApsAlert {
            title,
            subtitle,
            body,
            loc_key,
            loc_args,
            title_loc_key,
            title_loc_args,
            subtitle_loc_key,
            subtitle_loc_args,
            action_loc_key,
            launch_image,
            custom_data,
        } = alert;

        let loc_args = check_string_array(loc_args.as_deref());
        let title_loc_args = check_string_array(title_loc_args.as_deref());
        let subtitle_loc_args = check_string_array(subtitle_loc_args.as_deref());

        if loc_args.is_some() && loc_key.is_none() {
            return Err(FCMError::invalid("APSAlert.loc_key is required when specifying loc_args"));
        }
        if title_loc_args.is_some() && title_loc_key.is_none() {
            return Err(FCMError::invalid(
                "APSAlert.title_loc_key is required when specifying title_loc_args",
            ));
        }
        if subtitle_loc_args.is_some() && subtitle_loc_key.is_none() {
            return Err(FCMError::invalid(
                "APSAlert.subtitle_loc_key is required when specifying subtitle_loc_args",
            ));
        }

        let mut result = WireObject::new();
        result.put("title", title.as_deref());
        result.put("subtitle", subtitle.as_deref());
        result.put("body", body.as_deref());
        result.put("title-loc-key", title_loc_key.as_deref());
        result.put("title-loc-args", title_loc_args.map(string_array));
        result.put("subtitle-loc-key", subtitle_loc_key.as_deref());
        result.put("subtitle-loc-args", subtitle_loc_args.map(string_array));
        result.put("loc-key", loc_key.as_deref());
        result.put("loc-args", loc_args.map(string_array));
        result.put("action-loc-key", action_loc_key.as_deref());
        result.put("launch-image", launch_image.as_deref());

        if let Some(custom_data) = custom_data {
            for (key, value) in custom_data {
                if result.contains(key) {
                    return Err(FCMError::invalid(format!(
                        "Multiple specifications for {} in APSAlert",
                        key
                    )));
                }
                result.put_value(key.clone(), value.clone());
            }
        }

        Ok(result.into_non_empty().map(Value::Object))
    }

    fn encode_aps_sound(&self, sound: Option<&Sound>) -> FcmResult<Option<Value>> {
        match sound {
            None => Ok(None),
            Some(Sound::Name(name)) if !name.is_empty() => Ok(Some(Value::String(name.clone()))),
            Some(Sound::Name(_)) => Err(FCMError::invalid(
                "APS.sound must be a non-empty string or a CriticalSound",
            )),
            Some(Sound::Critical(sound)) => self.encode_critical_sound(sound).map(|s| Some(Value::Object(s))),
        }
    }

    fn encode_critical_sound(&self, sound: &CriticalSound) -> FcmResult<Map<String, Value>> {
        let name = check_string("CriticalSound.name", Some(sound.name.as_str()), true)?;

        if let Some(volume) = sound.volume {
            if !(0.0..=1.0).contains(&volume) {
                return Err(FCMError::invalid("CriticalSound.volume must be between [0,1]."));
            }
        }

        let mut result = WireObject::new();
        result.put("name", name);
        result.put("volume", sound.volume);
        if sound.critical == Some(true) {
            result.put("critical", Some(1));
        }
        Ok(result.into_map())
    }

    fn encode_notification(&self, notification: Option<&Notification>) -> Option<Map<String, Value>> {
        let notification = notification?;

        let mut result = WireObject::new();
        result.put("body", notification.body.as_deref());
        result.put("title", notification.title.as_deref());
        result.put("image", notification.image.as_deref());
        result.into_non_empty()
    }

    fn encode_fcm_options(&self, options: Option<&FcmOptions>) -> FcmResult<Option<Map<String, Value>>> {
        let Some(options) = options else {
            return Ok(None);
        };

        let mut result = WireObject::new();
        result.put(
            "analytics_label",
            check_analytics_label("Message.fcm_options", options.analytics_label.as_deref())?,
        );
        Ok(result.into_non_empty())
    }
}
