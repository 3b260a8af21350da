//! The in-progress configuration and the "test connection" workflow that
//! ties the parameter, URL and mapping checks to a live request.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use reqwest::blocking::{Client, ClientBuilder};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ApiConfig, ColumnDef};
use crate::conflicts::{merge_params, validate_param_conflicts, ConflictSources, ConflictValidation, SourceLabels};
use crate::error::{Error, Result};
use crate::params::{parse_any, to_object, to_query_string, Parameter, ParseOutcome};
use crate::render::{page_slice, page_summary, render_table, sort_items, suggest_columns};
use crate::response_mapping::{
    extract_items_from_response, extract_total_from_response, validate_mapping,
    validate_mapping_config, MappingConfigValidation, MappingValidationResult,
};
use crate::store::ConfigStore;
use crate::url_vars::{replace_url_params, UrlResolution};

/// Transport options for the test request.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout_secs: Option<f64>,
    pub request_timeout_secs: Option<f64>,
    pub user_agent: String,
    /// Refuse to send the request while parameter conflicts exist.
    pub strict_conflicts: bool,
}

impl HttpSettings {
    #[must_use]
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            connect_timeout_secs: None,
            request_timeout_secs: None,
            user_agent: user_agent.into(),
            strict_conflicts: false,
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self::new(concat!("apigrid/", env!("CARGO_PKG_VERSION")))
    }
}

/// Everything needed to send the request, plus the checks that produced it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedRequest {
    pub method: String,
    pub url: String,
    pub query: IndexMap<String, String>,
    pub headers: Vec<Parameter>,
    pub url_resolution: UrlResolution,
    pub mapping_config: MappingConfigValidation,
    pub conflicts: ConflictValidation,
}

impl PreparedRequest {
    /// Problems that make sending pointless. Conflicts only count when
    /// `strict_conflicts` is set.
    #[must_use]
    pub fn blocking_problems(&self, strict_conflicts: bool) -> Vec<String> {
        let mut problems = Vec::new();
        if self.url.trim().is_empty() {
            problems.push("API endpoint is required".to_string());
        }
        problems.extend(self.url_resolution.errors.iter().cloned());
        problems.extend(self.mapping_config.errors.iter().cloned());
        if strict_conflicts {
            if let Err(e) = self.conflicts.clone().into_result() {
                problems.push(e.to_string());
            }
        }
        problems
    }

    /// URL with the query string appended, for display.
    #[must_use]
    pub fn display_url(&self) -> String {
        let params: Vec<Parameter> = self
            .query
            .iter()
            .map(|(k, v)| Parameter::new(k.clone(), v.clone()))
            .collect();
        let qs = to_query_string(&params);
        if qs.is_empty() {
            self.url.clone()
        } else if self.url.contains('?') {
            format!("{}&{}", self.url, qs)
        } else {
            format!("{}?{}", self.url, qs)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestReport {
    pub request: PreparedRequest,
    pub fetched: bool,
    pub status: Option<u16>,
    pub elapsed_ms: Option<u64>,
    pub error: Option<String>,
    pub mapping: Option<MappingValidationResult>,
    pub items: Vec<Value>,
    pub total: Option<u64>,
    pub suggested_columns: Vec<ColumnDef>,
}

impl ConnectionTestReport {
    fn new(request: PreparedRequest) -> Self {
        Self {
            request,
            fetched: false,
            status: None,
            elapsed_ms: None,
            error: None,
            mapping: None,
            items: Vec::new(),
            total: None,
            suggested_columns: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.fetched
            && self.error.is_none()
            && self.mapping.as_ref().is_some_and(MappingValidationResult::is_valid)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewResult {
    pub report: ConnectionTestReport,
    pub table: String,
    pub summary: String,
}

/// Holds the configuration being edited.
#[derive(Debug, Clone)]
pub struct ConfigSession {
    config: ApiConfig,
    http: HttpSettings,
    labels: SourceLabels,
}

impl ConfigSession {
    #[must_use]
    pub fn new(config: ApiConfig, http: HttpSettings) -> Self {
        Self {
            config,
            http,
            labels: SourceLabels::default(),
        }
    }

    #[must_use]
    pub fn load(store: &ConfigStore, http: HttpSettings) -> Self {
        Self::new(store.load(), http)
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ApiConfig {
        &mut self.config
    }

    pub fn replace_config(&mut self, config: ApiConfig) {
        self.config = config;
    }

    #[must_use]
    pub fn http(&self) -> &HttpSettings {
        &self.http
    }

    #[must_use]
    pub fn with_labels(mut self, labels: SourceLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Replace the test parameters from pasted text. On parse errors the
    /// current list is kept.
    pub fn apply_test_params_text(&mut self, text: &str) -> ParseOutcome {
        let outcome = parse_any(text);
        if outcome.errors.is_empty() {
            self.config.api.test_params = outcome.params.clone();
        }
        outcome
    }

    /// Same as [`Self::apply_test_params_text`] for the default parameters.
    pub fn apply_default_params_text(&mut self, text: &str) -> ParseOutcome {
        let outcome = parse_any(text);
        if outcome.errors.is_empty() {
            self.config.api.default_params = outcome.params.clone();
        }
        outcome
    }

    /// Resolve the URL, check mapping and conflicts, then merge the three
    /// parameter sources (test, default, pagination; first wins).
    #[must_use]
    pub fn prepare_request(&self, page: u32) -> PreparedRequest {
        let api = &self.config.api;
        let url_resolution = replace_url_params(api.endpoint.trim(), &api.url_params);
        let mapping_config = validate_mapping_config(self.config.response_mapping.as_ref());

        let control = self.config.request_control_params(page);
        let conflicts = validate_param_conflicts(ConflictSources {
            test_params: &api.test_params,
            default_params: &api.default_params,
            pagination_params: &control,
            labels: &self.labels,
        });
        if !conflicts.valid {
            warn!(keys = ?conflicts.duplicates.duplicates, "conflicting parameters, first definition wins");
        }

        let merged = merge_params(&[&api.test_params, &api.default_params, &control]);
        let query = to_object(&merged);

        let mut headers: Vec<Parameter> = api
            .headers
            .iter()
            .filter(|h| h.active_key().is_some())
            .cloned()
            .collect();
        if let Some(token) = api.auth_token.as_deref().filter(|t| !t.trim().is_empty()) {
            headers.push(Parameter::new(AUTHORIZATION.as_str(), format!("Bearer {}", token.trim())));
        }

        debug!(url = %url_resolution.url, params = query.len(), "request prepared");
        PreparedRequest {
            method: if api.method.trim().is_empty() {
                "GET".to_string()
            } else {
                api.method.trim().to_uppercase()
            },
            url: url_resolution.url.clone(),
            query,
            headers,
            url_resolution,
            mapping_config,
            conflicts,
        }
    }

    /// Send the prepared request and check the response against the mapping.
    /// Never fails: transport and mapping problems are part of the report.
    #[must_use]
    pub fn test_connection(&self, page: u32) -> ConnectionTestReport {
        let request = self.prepare_request(page);
        let problems = request.blocking_problems(self.http.strict_conflicts);
        let mut report = ConnectionTestReport::new(request);
        if !problems.is_empty() {
            warn!(problems = problems.len(), "request not sent");
            report.error = Some(problems.join("; "));
            return report;
        }

        let started = Instant::now();
        let fetched = self.fetch(&report.request);
        report.elapsed_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
        let (status, body) = match fetched {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "test request failed");
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.fetched = true;
        report.status = Some(status);
        info!(status, elapsed_ms = report.elapsed_ms, url = %report.request.url, "response received");

        if !(200..300).contains(&status) {
            report.error = Some(format!("HTTP request failed with status {status}"));
            return report;
        }
        let json: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(e) => {
                report.error = Some(format!("Response is not valid JSON: {e}"));
                return report;
            }
        };
        self.analyze_response(&mut report, &json);
        report
    }

    fn analyze_response(&self, report: &mut ConnectionTestReport, json: &Value) {
        let mapping = self.config.response_mapping.as_ref();
        report.mapping = Some(match mapping {
            Some(m) => validate_mapping(Some(json), &m.data_key, &m.total_key),
            None => pass_through_check(json),
        });
        let items = extract_items_from_response(json, mapping)
            .map(<[Value]>::to_vec)
            .unwrap_or_default();
        report.total = Some(extract_total_from_response(json, mapping, items.len() as u64));
        report.suggested_columns = suggest_columns(&items);
        report.items = items;
    }

    fn fetch(&self, request: &PreparedRequest) -> Result<(u16, String)> {
        let mut builder: ClientBuilder = Client::builder().user_agent(self.http.user_agent.as_str());
        if let Some(secs) = self.http.connect_timeout_secs {
            builder = builder.connect_timeout(timeout_duration(secs)?);
        }
        if let Some(secs) = self.http.request_timeout_secs {
            builder = builder.timeout(timeout_duration(secs)?);
        }
        let client = builder.build()?;

        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::ConfigValidation(format!("Unsupported HTTP method: {}", request.method)))?;
        let mut req = client
            .request(method, request.url.as_str())
            .header(reqwest::header::ACCEPT, "application/json");
        let headers = build_headers(&request.headers)?;
        if !headers.is_empty() {
            req = req.headers(headers);
        }
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }

        info!(method = %request.method, url = %request.display_url(), "testing connection");
        let resp = req.send()?;
        let status = resp.status().as_u16();
        let body = resp.text()?;
        Ok((status, body))
    }

    /// Test the connection and lay the rows out as they will appear: local
    /// sorting and paging apply when the API does not do them itself.
    #[must_use]
    pub fn preview(&self, page: u32) -> PreviewResult {
        let report = self.test_connection(page);
        let pagination = &self.config.pagination;
        let sorting = &self.config.sorting;

        let mut rows = report.items.clone();
        if sorting.enabled && !sorting.server_side {
            if let Some(field) = sorting.default_field.as_deref().filter(|f| !f.is_empty()) {
                sort_items(&mut rows, field, sorting.default_order);
            }
        }
        let offset = u64::from(page.saturating_sub(pagination.first_page)) * u64::from(pagination.page_size);
        let rows: Vec<Value> = if pagination.enabled {
            rows
        } else {
            page_slice(&rows, page, pagination.page_size, pagination.first_page).to_vec()
        };

        let columns = if self.config.columns.is_empty() {
            report.suggested_columns.as_slice()
        } else {
            self.config.columns.as_slice()
        };
        let table = render_table(&rows, columns);
        let total = report.total.unwrap_or(rows.len() as u64);
        let summary = page_summary(offset, rows.len(), total);
        PreviewResult {
            report,
            table,
            summary,
        }
    }

    /// Persist the configuration. Refused while it has validation errors;
    /// warnings are logged.
    ///
    /// # Errors
    /// [`Error::ConfigValidation`] for an invalid configuration, or the store
    /// write error.
    pub fn save(&self, store: &ConfigStore) -> Result<()> {
        let report = self.config.validate();
        for w in &report.warnings {
            warn!(warning = %w, "saving configuration with warning");
        }
        if !report.valid {
            return Err(Error::ConfigValidation(report.errors.join("; ")));
        }
        store.save(&self.config)
    }
}

fn pass_through_check(json: &Value) -> MappingValidationResult {
    let mut result = MappingValidationResult::default();
    match json.as_array() {
        Some(items) => {
            result.items_found = true;
            result.items_is_array = true;
            result.items_count = items.len();
            if items.is_empty() {
                result
                    .warnings
                    .push("Response array is empty; no columns can be suggested".to_string());
            }
        }
        None => result.errors.push(
            "Response is not an array; configure a response mapping to locate the items".to_string(),
        ),
    }
    result
}

fn timeout_duration(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| Error::ConfigValidation(format!("Invalid timeout: {secs} seconds")))
}

fn build_headers(params: &[Parameter]) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for p in params {
        let Some(key) = p.active_key() else {
            continue;
        };
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| Error::ConfigValidation(format!("Invalid header name: {key}")))?;
        let value = HeaderValue::from_str(&p.value)
            .map_err(|_| Error::ConfigValidation(format!("Invalid header value for {key}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response_mapping::ResponseMapping;
    use serde_json::json;

    fn session_with(config: ApiConfig) -> ConfigSession {
        ConfigSession::new(config, HttpSettings::default())
    }

    fn base_config() -> ApiConfig {
        let mut cfg = ApiConfig::default();
        cfg.api.endpoint = "https://api.example.com/:version/users".to_string();
        cfg.api.url_params = vec![Parameter::new("version", "v2")];
        cfg
    }

    // ==================== prepare_request tests ====================

    #[test]
    fn test_prepare_request_merges_first_wins() {
        let mut cfg = base_config();
        cfg.api.test_params = vec![Parameter::new("limit", "5")];
        cfg.api.default_params = vec![Parameter::new("status", "open"), Parameter::new("limit", "50")];
        cfg.pagination.enabled = true;
        let prepared = session_with(cfg).prepare_request(2);

        assert_eq!(prepared.url, "https://api.example.com/v2/users");
        assert_eq!(prepared.query.get("limit"), Some(&"5".to_string()));
        assert_eq!(prepared.query.get("status"), Some(&"open".to_string()));
        assert_eq!(prepared.query.get("page"), Some(&"2".to_string()));
        assert!(!prepared.conflicts.valid);
        assert_eq!(prepared.conflicts.duplicates.duplicates, vec!["limit"]);
        assert!(prepared.blocking_problems(false).is_empty());
        assert_eq!(prepared.blocking_problems(true).len(), 1);
    }

    #[test]
    fn test_prepare_request_headers_and_method() {
        let mut cfg = base_config();
        cfg.api.method = "post".to_string();
        cfg.api.auth_token = Some(" tok ".to_string());
        cfg.api.headers = vec![Parameter::new("X-Trace", "1"), Parameter::new("X-Off", "1").disabled()];
        let prepared = session_with(cfg).prepare_request(1);
        assert_eq!(prepared.method, "POST");
        assert_eq!(
            prepared.headers,
            vec![Parameter::new("X-Trace", "1"), Parameter::new("authorization", "Bearer tok")]
        );
    }

    #[test]
    fn test_display_url() {
        let mut cfg = base_config();
        cfg.api.default_params = vec![Parameter::new("q", "a b")];
        let prepared = session_with(cfg).prepare_request(1);
        assert_eq!(prepared.display_url(), "https://api.example.com/v2/users?q=a%20b");
    }

    // ==================== test_connection short-circuit tests ====================

    #[test]
    fn test_connection_skipped_on_missing_url_variable() {
        let mut cfg = base_config();
        cfg.api.url_params.clear();
        let report = session_with(cfg).test_connection(1);
        assert!(!report.fetched);
        assert!(report.error.as_deref().unwrap_or_default().contains("version"));
        assert!(!report.is_success());
    }

    #[test]
    fn test_connection_skipped_on_bad_mapping_config() {
        let mut cfg = base_config();
        cfg.response_mapping = Some(ResponseMapping::new("data[0]", ""));
        let report = session_with(cfg).test_connection(1);
        assert!(!report.fetched);
        assert!(report.error.is_some());
    }

    #[test]
    fn test_connection_skipped_on_strict_conflict() {
        let mut cfg = base_config();
        cfg.api.test_params = vec![Parameter::new("a", "1")];
        cfg.api.default_params = vec![Parameter::new("a", "2")];
        let mut http = HttpSettings::default();
        http.strict_conflicts = true;
        let report = ConfigSession::new(cfg, http).test_connection(1);
        assert!(!report.fetched);
        assert!(report.error.as_deref().unwrap_or_default().contains("Conflict"));
    }

    // ==================== response analysis tests ====================

    #[test]
    fn test_analyze_response_with_mapping() {
        let mut cfg = base_config();
        cfg.response_mapping = Some(ResponseMapping::new("data", "meta.total"));
        let session = session_with(cfg);
        let mut report = ConnectionTestReport::new(session.prepare_request(1));
        session.analyze_response(
            &mut report,
            &json!({"data": [{"id": 1, "ok": true}], "meta": {"total": 30}}),
        );
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.total, Some(30));
        assert_eq!(report.suggested_columns.len(), 2);
        assert!(report.mapping.as_ref().unwrap().is_valid());
    }

    #[test]
    fn test_pass_through_check() {
        assert!(pass_through_check(&json!([1, 2])).is_valid());
        assert_eq!(pass_through_check(&json!([])).warnings.len(), 1);
        assert!(!pass_through_check(&json!({"data": []})).is_valid());
    }

    // ==================== params text tests ====================

    #[test]
    fn test_apply_params_text_keeps_list_on_error() {
        let mut session = session_with(base_config());
        let ok = session.apply_test_params_text("a=1&b=2");
        assert!(ok.errors.is_empty());
        assert_eq!(session.config().api.test_params.len(), 2);

        let bad = session.apply_test_params_text("[{\"value\": 1}]");
        assert!(!bad.errors.is_empty());
        assert_eq!(session.config().api.test_params.len(), 2);

        session.apply_default_params_text(r#"[{"key":"x","value":"y"}]"#);
        assert_eq!(session.config().api.default_params, vec![Parameter::new("x", "y")]);
    }

    #[test]
    fn test_build_headers_rejects_bad_name() {
        assert!(build_headers(&[Parameter::new("bad header", "x")]).is_err());
        assert_eq!(build_headers(&[Parameter::new("X-Ok", "1")]).unwrap().len(), 1);
    }

    #[test]
    fn test_timeout_duration_rejects_unrepresentable() {
        assert_eq!(timeout_duration(1.5).unwrap(), Duration::from_millis(1500));
        assert!(matches!(timeout_duration(f64::INFINITY), Err(Error::ConfigValidation(_))));
        assert!(matches!(timeout_duration(1e30), Err(Error::ConfigValidation(_))));
        assert!(timeout_duration(-1.0).is_err());
    }

    #[test]
    fn test_connection_with_infinite_timeout_reports_error() {
        let mut http = HttpSettings::default();
        http.request_timeout_secs = Some(f64::INFINITY);
        let report = ConfigSession::new(base_config(), http).test_connection(1);
        assert!(!report.fetched);
        assert!(report.error.as_deref().unwrap_or_default().contains("Invalid timeout"));
    }

    // ==================== save tests ====================

    #[test]
    fn test_save_refuses_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("s.json"));
        let session = session_with(ApiConfig::default());
        assert!(matches!(session.save(&store), Err(Error::ConfigValidation(_))));

        let session = session_with(base_config());
        session.save(&store).unwrap();
        assert_eq!(ConfigSession::load(&store, HttpSettings::default()).config(), &base_config());
    }
}
