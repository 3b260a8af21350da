//! Parameter lists and their three textual forms: key/value list, URL query
//! string and JSON array.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Characters that survive encoding but usually surprise people when typed
/// into a value field.
pub const SPECIAL_CHARS: &[char] = &['*', '(', ')', '&', '=', '?', '#', '+'];

/// Whether a parameter takes part in request building.
///
/// Persisted as the optional boolean `enabled`; an absent flag means enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "bool", into = "bool")]
pub enum ParamState {
    #[default]
    Enabled,
    Disabled,
}

impl ParamState {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, ParamState::Enabled)
    }
}

impl From<bool> for ParamState {
    fn from(enabled: bool) -> Self {
        if enabled {
            ParamState::Enabled
        } else {
            ParamState::Disabled
        }
    }
}

impl From<ParamState> for bool {
    fn from(state: ParamState) -> Self {
        state.is_enabled()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(deserialize_with = "de_stringish")]
    pub key: String,
    #[serde(default, deserialize_with = "de_stringish")]
    pub value: String,
    #[serde(default, skip_serializing_if = "ParamState::is_enabled")]
    pub enabled: ParamState,
}

impl Parameter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            enabled: ParamState::Enabled,
        }
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = ParamState::Disabled;
        self
    }

    /// Trimmed key, or `None` when the key is blank.
    #[must_use]
    pub fn effective_key(&self) -> Option<&str> {
        let k = self.key.trim();
        if k.is_empty() {
            None
        } else {
            Some(k)
        }
    }

    /// Key to use when building a request: present and enabled.
    #[must_use]
    pub fn active_key(&self) -> Option<&str> {
        if self.enabled.is_enabled() {
            self.effective_key()
        } else {
            None
        }
    }
}

/// Accepts strings, numbers, booleans and null where a string is expected.
fn de_stringish<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    Ok(value_to_param_string(&v))
}

fn value_to_param_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamFormat {
    Json,
    QueryString,
    Unknown,
}

impl fmt::Display for ParamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamFormat::Json => write!(f, "json"),
            ParamFormat::QueryString => write!(f, "queryString"),
            ParamFormat::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of [`parse_any`]. `errors` non-empty implies `params` is empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseOutcome {
    pub params: Vec<Parameter>,
    pub format: ParamFormat,
    pub errors: Vec<String>,
}

// =====================
// Parsing
// =====================

/// Parse `a=1&b=2` (optionally prefixed with `?`).
///
/// # Errors
/// Returns [`Error::Format`] when a segment holds a malformed percent escape
/// or decodes to invalid UTF-8.
pub fn parse_query_string(input: &str) -> Result<Vec<Parameter>> {
    let trimmed = input.trim();
    let query = trimmed.strip_prefix('?').unwrap_or(trimmed);
    let mut params = Vec::new();
    for segment in query.split('&') {
        if segment.is_empty() {
            continue;
        }
        let (raw_key, raw_value) = segment.split_once('=').unwrap_or((segment, ""));
        let key = decode_component(raw_key)?;
        let value = decode_component(raw_value)?;
        if key.trim().is_empty() {
            continue;
        }
        params.push(Parameter::new(key, value));
    }
    Ok(params)
}

/// Parse `[{"key": "a", "value": "1"}, ...]`.
///
/// # Errors
/// Returns [`Error::Format`] when the text is not JSON, the root is not an
/// array, or an element has no `key`.
pub fn parse_json(input: &str) -> Result<Vec<Parameter>> {
    let root: Value = serde_json::from_str(input.trim())
        .map_err(|e| Error::Format(format!("Invalid JSON: {e}")))?;
    let Value::Array(items) = root else {
        return Err(Error::Format("JSON must be an array of parameters".to_string()));
    };
    let mut params = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let key = item
            .get("key")
            .ok_or_else(|| Error::Format(format!("Item {idx} is missing \"key\"")))?;
        let value = item.get("value").map(value_to_param_string).unwrap_or_default();
        let mut param = Parameter::new(value_to_param_string(key).trim(), value.trim());
        if item.get("enabled") == Some(&Value::Bool(false)) {
            param.enabled = ParamState::Disabled;
        }
        params.push(param);
    }
    Ok(params)
}

/// Guess which representation `input` is written in.
#[must_use]
pub fn detect_format(input: &str) -> ParamFormat {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return ParamFormat::Unknown;
    }
    let looks_like_json = trimmed.starts_with('[') || trimmed.starts_with('{');
    if looks_like_json && serde_json::from_str::<Value>(trimmed).is_ok() {
        return ParamFormat::Json;
    }
    if trimmed.contains('=') || trimmed.contains('&') {
        return ParamFormat::QueryString;
    }
    if !looks_like_json && !trimmed.contains(char::is_whitespace) {
        return ParamFormat::QueryString;
    }
    ParamFormat::Unknown
}

/// Detect and parse. Never fails: problems end up in `errors`.
#[must_use]
pub fn parse_any(input: &str) -> ParseOutcome {
    let format = detect_format(input);
    let parsed = match format {
        ParamFormat::Json => parse_json(input),
        ParamFormat::QueryString => parse_query_string(input),
        ParamFormat::Unknown if input.trim().is_empty() => Ok(Vec::new()),
        ParamFormat::Unknown => Err(Error::Format(
            "Unrecognized format: expected a query string (a=1&b=2) or a JSON array".to_string(),
        )),
    };
    match parsed {
        Ok(params) => ParseOutcome {
            params,
            format,
            errors: Vec::new(),
        },
        Err(e) => {
            tracing::debug!(%format, error = %e, "parameter text rejected");
            ParseOutcome {
                params: Vec::new(),
                format,
                errors: vec![e.to_string()],
            }
        }
    }
}

// =====================
// Serialization
// =====================

/// Percent-encode a single key or value.
#[must_use]
pub fn encode_param(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Render as `a=1&b&c=3`. Blank keys and disabled parameters are skipped;
/// an empty value emits the bare key. Keys are written as stored.
#[must_use]
pub fn to_query_string(params: &[Parameter]) -> String {
    params
        .iter()
        .filter(|p| p.active_key().is_some())
        .map(|p| {
            if p.value.is_empty() {
                encode_param(&p.key)
            } else {
                format!("{}={}", encode_param(&p.key), encode_param(&p.value))
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Render as a JSON array, 2-space indented when `pretty`. Disabled
/// parameters are kept with `"enabled": false`.
#[must_use]
pub fn to_json(params: &[Parameter], pretty: bool) -> String {
    let kept: Vec<&Parameter> = params.iter().filter(|p| p.effective_key().is_some()).collect();
    let out = if pretty {
        serde_json::to_string_pretty(&kept)
    } else {
        serde_json::to_string(&kept)
    };
    out.unwrap_or_default()
}

/// Flatten to a query object. Later duplicates overwrite earlier ones, which
/// is the opposite tie-break of [`crate::conflicts::merge_params`].
#[must_use]
pub fn to_object(params: &[Parameter]) -> IndexMap<String, String> {
    let mut out = IndexMap::new();
    for p in params {
        if let Some(key) = p.active_key() {
            out.insert(key.to_string(), p.value.clone());
        }
    }
    out
}

#[must_use]
pub fn has_special_chars(value: &str) -> bool {
    value.contains(SPECIAL_CHARS)
}

/// One warning per parameter whose value contains a character from
/// [`SPECIAL_CHARS`].
#[must_use]
pub fn special_char_warnings(params: &[Parameter]) -> Vec<String> {
    params
        .iter()
        .filter_map(|p| {
            let key = p.effective_key()?;
            has_special_chars(&p.value).then(|| {
                format!(
                    "Value of \"{key}\" contains special characters ({}); it will be percent-encoded",
                    p.value
                )
            })
        })
        .collect()
}

fn decode_component(raw: &str) -> Result<String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return Err(Error::Format(format!("Malformed percent-encoding in \"{raw}\"")));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    urlencoding::decode(raw)
        .map(std::borrow::Cow::into_owned)
        .map_err(|_| Error::Format(format!("Percent-encoding in \"{raw}\" is not valid UTF-8")))
}
