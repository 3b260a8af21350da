//! The configuration object produced by the wizard and consumed by the
//! data-table component: endpoint, parameter lists, mapping, columns,
//! pagination and sorting.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::conflicts::{validate_param_conflicts, ConflictSources, SourceLabels};
use crate::error::{Error, Result};
use crate::params::{special_char_warnings, Parameter};
use crate::render::Renderer;
use crate::response_mapping::{validate_mapping_config, ResponseMapping};
use crate::url_vars::validate_url_params;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiConfig {
    pub api: ApiSettings,
    /// `None` means the response body is the items array itself.
    pub response_mapping: Option<ResponseMapping>,
    pub columns: Vec<ColumnDef>,
    pub pagination: PaginationSettings,
    pub sorting: SortSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// URL template, may contain `:name` path variables.
    pub endpoint: String,
    pub method: String,
    /// Sent as `Authorization: Bearer <token>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub headers: Vec<Parameter>,
    /// Values for the endpoint's path variables.
    pub url_params: Vec<Parameter>,
    /// Query parameters used only while testing the connection.
    pub test_params: Vec<Parameter>,
    /// Query parameters sent with every request.
    pub default_params: Vec<Parameter>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            method: "GET".to_string(),
            auth_token: None,
            headers: Vec::new(),
            url_params: Vec::new(),
            test_params: Vec::new(),
            default_params: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnDef {
    /// Dot path into an item, e.g. `address.city`.
    pub key: String,
    pub title: String,
    pub renderer: Renderer,
    pub sortable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u16>,
}

impl ColumnDef {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginationMode {
    #[default]
    Page,
    /// `pageParam` carries a zero-based record offset instead of a page number.
    Offset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaginationSettings {
    pub enabled: bool,
    pub mode: PaginationMode,
    pub page_param: String,
    pub size_param: String,
    pub page_size: u32,
    pub first_page: u32,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: PaginationMode::Page,
            page_param: "page".to_string(),
            size_param: "limit".to_string(),
            page_size: 10,
            first_page: 1,
        }
    }
}

impl PaginationSettings {
    /// Query parameters requesting `page` (counted from `first_page`).
    #[must_use]
    pub fn pagination_params(&self, page: u32) -> Vec<Parameter> {
        if !self.enabled {
            return Vec::new();
        }
        let position = match self.mode {
            PaginationMode::Page => u64::from(page),
            PaginationMode::Offset => {
                u64::from(page.saturating_sub(self.first_page)) * u64::from(self.page_size)
            }
        };
        vec![
            Parameter::new(self.page_param.clone(), position.to_string()),
            Parameter::new(self.size_param.clone(), self.page_size.to_string()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SortSettings {
    pub enabled: bool,
    pub sort_param: String,
    pub order_param: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_field: Option<String>,
    pub default_order: SortOrder,
    /// Sort by query parameters; otherwise rows are sorted locally.
    pub server_side: bool,
}

impl Default for SortSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            sort_param: "sort".to_string(),
            order_param: "order".to_string(),
            default_field: None,
            default_order: SortOrder::Asc,
            server_side: true,
        }
    }
}

impl SortSettings {
    #[must_use]
    pub fn sort_params(&self) -> Vec<Parameter> {
        match &self.default_field {
            Some(field) if self.enabled && self.server_side && !field.is_empty() => vec![
                Parameter::new(self.sort_param.clone(), field.clone()),
                Parameter::new(self.order_param.clone(), self.default_order.as_str()),
            ],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConfigReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ApiConfig {
    /// Parameters generated by the tool itself for `page`: paging plus
    /// server-side sorting. This is the "pagination" conflict source.
    #[must_use]
    pub fn request_control_params(&self, page: u32) -> Vec<Parameter> {
        let mut params = self.pagination.pagination_params(page);
        params.extend(self.sorting.sort_params());
        params
    }

    /// Whole-configuration check, as run before saving.
    #[must_use]
    pub fn validate(&self) -> ConfigReport {
        let mut report = ConfigReport::default();

        if self.api.endpoint.trim().is_empty() {
            report.errors.push("API endpoint is required".to_string());
        } else {
            let url = validate_url_params(&self.api.endpoint, &self.api.url_params);
            report.errors.extend(url.errors);
            report.warnings.extend(url.warnings);
        }

        report
            .errors
            .extend(validate_mapping_config(self.response_mapping.as_ref()).errors);

        let labels = SourceLabels::default();
        let control = self.request_control_params(self.pagination.first_page);
        let conflicts = validate_param_conflicts(ConflictSources {
            test_params: &self.api.test_params,
            default_params: &self.api.default_params,
            pagination_params: &control,
            labels: &labels,
        });
        report.warnings.extend(conflicts.errors);
        report.warnings.extend(conflicts.warnings);
        report.warnings.extend(special_char_warnings(&self.api.default_params));
        report.warnings.extend(special_char_warnings(&self.api.test_params));

        if self.pagination.enabled && self.pagination.page_size == 0 {
            report.errors.push("Page size must be greater than zero".to_string());
        }
        if self.sorting.enabled && self.sorting.server_side && self.sorting.sort_param.trim().is_empty() {
            report.errors.push("Sort parameter name is required for server-side sorting".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for (idx, col) in self.columns.iter().enumerate() {
            let key = col.key.trim();
            if key.is_empty() {
                report.errors.push(format!("Column {} has no key", idx + 1));
            } else if !seen.insert(key) {
                report.warnings.push(format!("Column \"{key}\" is defined more than once"));
            }
        }

        report.valid = report.errors.is_empty();
        report
    }
}

/// Parse a configuration from YAML or JSON text.
///
/// # Errors
/// Returns the YAML parse error when neither format accepts the text.
pub fn parse_config(text: &str) -> Result<ApiConfig> {
    match serde_yaml::from_str::<ApiConfig>(text) {
        Ok(cfg) => Ok(cfg),
        Err(yaml_err) => serde_json::from_str::<ApiConfig>(text).map_err(|_| Error::Yaml(yaml_err)),
    }
}

/// # Errors
/// Fails when the file cannot be read or parsed.
pub fn load_config_file(path: &Path) -> Result<ApiConfig> {
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}
