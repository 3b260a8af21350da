//! `:name` path variables in endpoint templates such as
//! `https://api.example.com/:version/users/:id`.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::params::{encode_param, Parameter};

static URL_VAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([a-zA-Z_][a-zA-Z0-9_]*)").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlResolution {
    pub url: String,
    pub missing: Vec<String>,
    pub unused: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Every variable occurrence, left to right, without the leading colon.
/// Repeated variables are returned once per occurrence.
#[must_use]
pub fn extract_url_variables(url: &str) -> Vec<String> {
    URL_VAR_RE
        .captures_iter(url)
        .map(|caps| caps[1].to_string())
        .collect()
}

#[must_use]
pub fn has_url_variables(url: &str) -> bool {
    URL_VAR_RE.is_match(url)
}

fn distinct_variables(url: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    extract_url_variables(url)
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

fn lookup<'a>(params: &'a [Parameter], name: &str) -> Option<&'a Parameter> {
    params
        .iter()
        .find(|p| p.active_key() == Some(name))
}

fn unused_keys(variables: &[String], params: &[Parameter]) -> Vec<String> {
    let mut seen = HashSet::new();
    params
        .iter()
        .filter_map(Parameter::active_key)
        .filter(|k| !variables.iter().any(|v| v == k))
        .filter(|k| seen.insert(k.to_string()))
        .map(str::to_string)
        .collect()
}

/// Substitute every variable that has a non-empty value; the rest stay in the
/// output as `:name` and are listed in `missing`.
#[must_use]
pub fn replace_url_params(url: &str, params: &[Parameter]) -> UrlResolution {
    let variables = distinct_variables(url);
    let missing: Vec<String> = variables
        .iter()
        .filter(|v| lookup(params, v).map_or(true, |p| p.value.is_empty()))
        .cloned()
        .collect();

    let resolved = URL_VAR_RE
        .replace_all(url, |caps: &regex::Captures| {
            match lookup(params, &caps[1]) {
                Some(p) if !p.value.is_empty() => encode_param(&p.value),
                _ => caps[0].to_string(),
            }
        })
        .to_string();

    let errors = if missing.is_empty() {
        Vec::new()
    } else {
        vec![format!("Missing values for URL variables: {}", missing.join(", "))]
    };

    UrlResolution {
        url: resolved,
        unused: unused_keys(&variables, params),
        missing,
        errors,
    }
}

#[must_use]
pub fn validate_url_params(url: &str, params: &[Parameter]) -> UrlValidation {
    let variables = distinct_variables(url);
    let errors: Vec<String> = variables
        .iter()
        .filter(|v| lookup(params, v).map_or(true, |p| p.value.is_empty()))
        .map(|v| format!("URL variable \":{v}\" has no value"))
        .collect();

    let mut warnings: Vec<String> = unused_keys(&variables, params)
        .into_iter()
        .map(|k| format!("Parameter \"{k}\" is not used in the URL"))
        .collect();
    let blank = params.iter().filter(|p| p.effective_key().is_none()).count();
    for _ in 0..blank {
        warnings.push("A URL parameter has an empty name".to_string());
    }

    UrlValidation {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// One parameter per distinct variable, in template order, reusing existing
/// entries where the key matches.
#[must_use]
pub fn suggest_url_params(url: &str, existing: &[Parameter]) -> Vec<Parameter> {
    distinct_variables(url)
        .into_iter()
        .map(|v| {
            existing
                .iter()
                .find(|p| p.effective_key() == Some(v.as_str()))
                .cloned()
                .unwrap_or_else(|| Parameter::new(v, ""))
        })
        .collect()
}
