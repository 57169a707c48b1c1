//! Field checks shared by the message encoder
//!
//! Every check is nil-safe: `None` in gives `None` out and is never an error
//! unless the check says the field is required.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::errors::{FCMError, FcmResult};

static ANALYTICS_LABEL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\-_.~%]{1,50}$").expect("analytics label pattern is valid"));

static RGB_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("rgb pattern is valid"));

static RGBA_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9a-fA-F]{8}$").expect("rgba pattern is valid"));

pub(crate) fn check_string<'a>(label: &str, value: Option<&'a str>, non_empty: bool) -> FcmResult<Option<&'a str>> {
    match value {
        Some("") if non_empty => Err(FCMError::invalid(format!("{} must be a non-empty string.", label))),
        other => Ok(other),
    }
}

/// Empty maps are treated as absent
pub(crate) fn check_string_map<'a>(value: Option<&'a HashMap<String, String>>) -> Option<&'a HashMap<String, String>> {
    value.filter(|map| !map.is_empty())
}

/// Empty arrays are treated as absent
pub(crate) fn check_string_array<'a>(value: Option<&'a [String]>) -> Option<&'a [String]> {
    value.filter(|items| !items.is_empty())
}

pub(crate) fn check_analytics_label<'a>(label: &str, value: Option<&'a str>) -> FcmResult<Option<&'a str>> {
    match value {
        Some(v) if !ANALYTICS_LABEL_PATTERN.is_match(v) => {
            Err(FCMError::invalid(format!("{} is malformed", label)))
        }
        other => Ok(other),
    }
}

/// Accepts `#RRGGBB`, and `#RRGGBBAA` when `allow_alpha` is set
pub(crate) fn check_color<'a>(
    label: &str,
    value: Option<&'a str>,
    allow_alpha: bool,
    required: bool,
) -> FcmResult<Option<&'a str>> {
    let value = match value {
        Some(v) => v,
        None if required => return Err(FCMError::invalid(format!("{} is required", label))),
        None => return Ok(None),
    };

    if RGB_PATTERN.is_match(value) || (allow_alpha && RGBA_PATTERN.is_match(value)) {
        return Ok(Some(value));
    }

    if allow_alpha {
        Err(FCMError::invalid(format!("{} must be in the form #RRGGBB or #RRGGBBAA", label)))
    } else {
        Err(FCMError::invalid(format!("{} must be in the form #RRGGBB", label)))
    }
}

/// Validate a duration in seconds and render it in the protobuf JSON form
pub(crate) fn encode_duration(label: &str, seconds: f64) -> FcmResult<String> {
    if !seconds.is_finite() {
        return Err(FCMError::invalid(format!("{} must be a numeric duration in seconds", label)));
    }
    if seconds < 0.0 {
        return Err(FCMError::invalid(format!("{} must not be negative", label)));
    }
    Ok(to_seconds_string(seconds))
}

/// `1.0` → `"1s"`, `1.5` → `"1.500000000s"`
pub fn to_seconds_string(seconds: f64) -> String {
    if seconds.fract() > 0.0 {
        format!("{:.9}s", seconds)
    } else {
        format!("{:.0}s", seconds)
    }
}

/// RGBA components in [0, 1], as the wire `Color` message expects
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub alpha: f64,
}

/// Convert `#RRGGBB` or `#RRGGBBAA` to color components; missing alpha is opaque
pub(crate) fn encode_color(label: &str, value: &str, allow_alpha: bool) -> FcmResult<Color> {
    let value = check_color(label, Some(value), allow_alpha, true)?.unwrap_or_default();
    let hex = match value.len() {
        7 => format!("{}FF", &value[1..]),
        _ => value[1..].to_string(),
    };

    let component = |range: std::ops::Range<usize>| -> FcmResult<f64> {
        u8::from_str_radix(&hex[range], 16)
            .map(|byte| f64::from(byte) / 255.0)
            .map_err(|_| FCMError::invalid(format!("{} is malformed", label)))
    };

    Ok(Color {
        red: component(0..2)?,
        green: component(2..4)?,
        blue: component(4..6)?,
        alpha: component(6..8)?,
    })
}
