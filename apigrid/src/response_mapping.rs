//! Locating the record list and total count inside an arbitrary JSON
//! response using dot-notation paths (`data.items`, `meta.page.total`).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

static MAPPING_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._]*$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalSource {
    #[default]
    Body,
}

/// Where the items and the total live in a response body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMapping {
    #[serde(default)]
    pub data_key: String,
    #[serde(default)]
    pub total_key: String,
    #[serde(default)]
    pub total_source: TotalSource,
}

impl ResponseMapping {
    pub fn new(data_key: impl Into<String>, total_key: impl Into<String>) -> Self {
        Self {
            data_key: data_key.into(),
            total_key: total_key.into(),
            total_source: TotalSource::Body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingValidationResult {
    pub items_found: bool,
    pub items_count: usize,
    pub items_is_array: bool,
    pub total_found: bool,
    pub total_value: Option<u64>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl MappingValidationResult {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Strict view for callers that cannot continue without items.
    ///
    /// # Errors
    /// Returns [`Error::Mapping`] carrying the first error message.
    pub fn into_result(self) -> Result<Self> {
        match self.errors.first() {
            Some(first) => Err(Error::Mapping(first.clone())),
            None => Ok(self),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingConfigValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl MappingConfigValidation {
    /// # Errors
    /// Returns [`Error::ConfigValidation`] joining all messages.
    pub fn into_result(self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(Error::ConfigValidation(self.errors.join("; ")))
        }
    }
}

/// Walk `path` through objects (by key) and arrays (by numeric index).
/// An empty path yields `obj`; anything unreachable yields `None`.
#[must_use]
pub fn get_nested_value<'a>(obj: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(obj);
    }
    path.split('.').try_fold(obj, |current, seg| match current {
        Value::Object(map) => map.get(seg),
        Value::Array(arr) => seg.parse::<usize>().ok().and_then(|i| arr.get(i)),
        _ => None,
    })
}

fn is_falsy(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Integer coercion for totals: non-negative numbers (fractions truncated) and
/// strings starting with digits (`"50"`, `" 12 items"`).
#[must_use]
pub fn coerce_total(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.trunc() as u64)
        }),
        Value::String(s) => {
            let s = s.trim_start();
            let s = s.strip_prefix('+').unwrap_or(s);
            let digits: String = s.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u64>().ok()
        }
        _ => None,
    }
}

/// Check a mapping against a real response. Never fails; every problem is a
/// message in `errors` or `warnings`.
#[must_use]
pub fn validate_mapping(
    response: Option<&Value>,
    items_path: &str,
    total_path: &str,
) -> MappingValidationResult {
    let mut result = MappingValidationResult::default();
    let Some(data) = response.filter(|v| !is_falsy(v)) else {
        result.errors.push("No response data to validate".to_string());
        return result;
    };

    if items_path.is_empty() {
        result.errors.push("Items path is required".to_string());
    } else {
        match get_nested_value(data, items_path) {
            None | Some(Value::Null) => result
                .errors
                .push(format!("Items path \"{items_path}\" not found in response")),
            Some(Value::Array(items)) => {
                result.items_found = true;
                result.items_is_array = true;
                result.items_count = items.len();
                if items.is_empty() {
                    result.warnings.push(format!(
                        "Items array at \"{items_path}\" is empty; no columns can be suggested"
                    ));
                }
            }
            Some(other) => result.errors.push(format!(
                "Path \"{items_path}\" was found but is not an array (got {})",
                type_name(other)
            )),
        }
    }

    if !total_path.is_empty() {
        match get_nested_value(data, total_path) {
            None | Some(Value::Null) => result.warnings.push(format!(
                "Total path \"{total_path}\" not found; the item count will be used instead"
            )),
            Some(raw) => match coerce_total(raw) {
                Some(total) => {
                    result.total_found = true;
                    result.total_value = Some(total);
                }
                None => result.warnings.push(format!(
                    "Total at \"{total_path}\" is not a valid number (got {raw}); the item count will be used instead"
                )),
            },
        }
    }

    tracing::debug!(
        items_path,
        total_path,
        items_found = result.items_found,
        items_count = result.items_count,
        errors = result.errors.len(),
        "mapping validated"
    );
    result
}

/// Items array of a response. Without a mapping the body itself must be the
/// array.
#[must_use]
pub fn extract_items_from_response<'a>(
    response: &'a Value,
    mapping: Option<&ResponseMapping>,
) -> Option<&'a [Value]> {
    let target = match mapping {
        None => Some(response),
        Some(m) => get_nested_value(response, &m.data_key),
    };
    target.and_then(Value::as_array).map(Vec::as_slice)
}

#[must_use]
pub fn extract_total_from_response(
    response: &Value,
    mapping: Option<&ResponseMapping>,
    fallback_count: u64,
) -> u64 {
    mapping
        .filter(|m| !m.total_key.is_empty())
        .and_then(|m| get_nested_value(response, &m.total_key))
        .and_then(coerce_total)
        .unwrap_or(fallback_count)
}

/// Structural checks on a mapping. No mapping at all is valid (pass-through).
#[must_use]
pub fn validate_mapping_config(mapping: Option<&ResponseMapping>) -> MappingConfigValidation {
    let mut errors = Vec::new();
    if let Some(m) = mapping {
        if m.data_key.trim().is_empty() {
            errors.push("Items path (dataKey) is required when response mapping is enabled".to_string());
        } else if !MAPPING_PATH_RE.is_match(&m.data_key) {
            errors.push(format!(
                "Items path \"{}\" may only contain letters, digits, '.' and '_'",
                m.data_key
            ));
        }
        if !m.total_key.is_empty() && !MAPPING_PATH_RE.is_match(&m.total_key) {
            errors.push(format!(
                "Total path \"{}\" may only contain letters, digits, '.' and '_'",
                m.total_key
            ));
        }
    }
    MappingConfigValidation {
        valid: errors.is_empty(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "data": {
                "items": [{"id": 1}, {"id": 2}],
                "pagination": {"total": 50}
            }
        })
    }

    // ==================== get_nested_value tests ====================

    #[test]
    fn test_get_nested_value_paths() {
        let v = sample();
        assert_eq!(get_nested_value(&v, "data.pagination.total"), Some(&json!(50)));
        assert_eq!(get_nested_value(&v, "data.items.1.id"), Some(&json!(2)));
        assert_eq!(get_nested_value(&v, ""), Some(&v));
        assert_eq!(get_nested_value(&v, "data.missing.deeper"), None);
        assert_eq!(get_nested_value(&v, "data.items.x"), None);
    }

    #[test]
    fn test_get_nested_value_short_circuits_on_null() {
        let v = json!({"a": null});
        assert_eq!(get_nested_value(&v, "a"), Some(&Value::Null));
        assert_eq!(get_nested_value(&v, "a.b.c"), None);
    }

    // ==================== validate_mapping tests ====================

    #[test]
    fn test_validate_mapping_success() {
        let v = sample();
        let r = validate_mapping(Some(&v), "data.items", "data.pagination.total");
        assert_eq!(
            r,
            MappingValidationResult {
                items_found: true,
                items_count: 2,
                items_is_array: true,
                total_found: true,
                total_value: Some(50),
                errors: vec![],
                warnings: vec![],
            }
        );
    }

    #[test]
    fn test_validate_mapping_missing_items() {
        let v = json!({"data": {}});
        let r = validate_mapping(Some(&v), "data.items", "");
        assert!(!r.items_found);
        assert_eq!(r.errors.len(), 1);
        assert!(r.errors[0].contains("\"data.items\""));
        assert!(r.errors[0].contains("not found"));
    }

    #[test]
    fn test_validate_mapping_not_array() {
        let v = json!({"data": {"items": {"id": 1}}});
        let r = validate_mapping(Some(&v), "data.items", "");
        assert!(!r.items_found);
        assert!(!r.items_is_array);
        assert!(r.errors[0].contains("not an array"));
        assert!(r.errors[0].contains("object"));
    }

    #[test]
    fn test_validate_mapping_empty_array_warns() {
        let v = json!({"items": []});
        let r = validate_mapping(Some(&v), "items", "");
        assert!(r.items_found);
        assert_eq!(r.items_count, 0);
        assert!(r.errors.is_empty());
        assert_eq!(r.warnings.len(), 1);
    }

    #[test]
    fn test_validate_mapping_empty_items_path() {
        let v = json!({"items": []});
        let r = validate_mapping(Some(&v), "", "total");
        assert_eq!(r.errors, vec!["Items path is required".to_string()]);
        assert_eq!(r.warnings.len(), 1);
    }

    #[test]
    fn test_validate_mapping_falsy_response() {
        for v in [Value::Null, json!(false), json!(0), json!("")] {
            let r = validate_mapping(Some(&v), "items", "total");
            assert_eq!(r.errors.len(), 1);
            assert!(r.warnings.is_empty());
            assert!(!r.items_found && !r.total_found);
        }
        let r = validate_mapping(None, "items", "");
        assert_eq!(r.errors.len(), 1);
    }

    #[test]
    fn test_validate_mapping_total_warnings() {
        let v = json!({"items": [1], "total": "lots"});
        let r = validate_mapping(Some(&v), "items", "total");
        assert!(!r.total_found);
        assert_eq!(r.total_value, None);
        assert!(r.warnings[0].contains("\"lots\""));

        let r = validate_mapping(Some(&v), "items", "meta.total");
        assert!(r.warnings[0].contains("not found"));
    }

    #[test]
    fn test_validate_mapping_string_total() {
        let v = json!({"items": [1], "total": "120"});
        let r = validate_mapping(Some(&v), "items", "total");
        assert!(r.total_found);
        assert_eq!(r.total_value, Some(120));
    }

    #[test]
    fn test_into_result() {
        let v = json!({"data": {}});
        assert!(matches!(
            validate_mapping(Some(&v), "data.items", "").into_result(),
            Err(Error::Mapping(_))
        ));
        let ok = sample();
        assert!(validate_mapping(Some(&ok), "data.items", "").into_result().is_ok());
    }

    // ==================== coerce_total tests ====================

    #[test]
    fn test_coerce_total() {
        assert_eq!(coerce_total(&json!(7)), Some(7));
        assert_eq!(coerce_total(&json!(7.9)), Some(7));
        assert_eq!(coerce_total(&json!(-1)), None);
        assert_eq!(coerce_total(&json!("42abc")), Some(42));
        assert_eq!(coerce_total(&json!("-3")), None);
        assert_eq!(coerce_total(&json!(true)), None);
        assert_eq!(coerce_total(&json!([1])), None);
    }

    // ==================== extraction tests ====================

    #[test]
    fn test_extract_items_pass_through() {
        let arr = json!([{"a": 1}]);
        assert_eq!(extract_items_from_response(&arr, None).map(<[Value]>::len), Some(1));
        let obj = json!({"a": 1});
        assert!(extract_items_from_response(&obj, None).is_none());
    }

    #[test]
    fn test_extract_items_with_mapping() {
        let v = sample();
        let m = ResponseMapping::new("data.items", "");
        assert_eq!(extract_items_from_response(&v, Some(&m)).map(<[Value]>::len), Some(2));
        let wrong = ResponseMapping::new("data.pagination", "");
        assert!(extract_items_from_response(&v, Some(&wrong)).is_none());
    }

    #[test]
    fn test_extract_total() {
        let v = sample();
        let m = ResponseMapping::new("data.items", "data.pagination.total");
        assert_eq!(extract_total_from_response(&v, Some(&m), 2), 50);
        let no_total = ResponseMapping::new("data.items", "");
        assert_eq!(extract_total_from_response(&v, Some(&no_total), 2), 2);
        let bad = ResponseMapping::new("data.items", "data.items");
        assert_eq!(extract_total_from_response(&v, Some(&bad), 2), 2);
        assert_eq!(extract_total_from_response(&v, None, 9), 9);
    }

    // ==================== validate_mapping_config tests ====================

    #[test]
    fn test_validate_mapping_config() {
        assert!(validate_mapping_config(None).valid);
        assert!(validate_mapping_config(Some(&ResponseMapping::new("data.items_v2", "meta.total"))).valid);

        let missing = validate_mapping_config(Some(&ResponseMapping::new("", "")));
        assert!(!missing.valid);
        assert_eq!(missing.errors.len(), 1);

        let illegal = validate_mapping_config(Some(&ResponseMapping::new("data[0]", "meta-total")));
        assert!(!illegal.valid);
        assert_eq!(illegal.errors.len(), 2);
        assert!(matches!(illegal.into_result(), Err(Error::ConfigValidation(_))));
    }

    #[test]
    fn test_response_mapping_serde() {
        let m: ResponseMapping =
            serde_json::from_str(r#"{"dataKey":"data","totalKey":"total","totalSource":"body"}"#).unwrap();
        assert_eq!(m, ResponseMapping::new("data", "total"));
    }
}
