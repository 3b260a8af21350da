//! Configuration helpers for grids backed by REST endpoints.
//!
//! The core is four pure, never-panicking converters and validators: the
//! parameter format converter ([`params`]), the URL path-variable resolver
//! ([`url_vars`]), the response mapping resolver ([`response_mapping`]) and the
//! parameter conflict validator ([`conflicts`]). [`session::ConfigSession`]
//! sequences them around a live test request; [`cli`] exposes everything on
//! the command line.

pub mod cli;
pub mod config;
pub mod conflicts;
pub mod error;
pub mod params;
pub mod render;
pub mod response_mapping;
pub mod session;
pub mod store;
pub mod url_vars;

// =====================
// Public API
// =====================

pub use config::{parse_config, load_config_file, ApiConfig, ColumnDef, ConfigReport, PaginationMode, SortOrder};
pub use conflicts::{
    find_duplicate_keys, merge_params, validate_param_conflicts, ConflictSources, ConflictValidation,
    DuplicateReport, SourceLabels,
};
pub use error::{Error, Result};
pub use params::{
    detect_format, parse_any, parse_json, parse_query_string, to_json, to_object, to_query_string,
    ParamFormat, Parameter, ParseOutcome,
};
pub use render::{render_cell, render_table, suggest_columns, Renderer};
pub use response_mapping::{
    extract_items_from_response, extract_total_from_response, get_nested_value, validate_mapping,
    validate_mapping_config, MappingValidationResult, ResponseMapping,
};
pub use session::{ConfigSession, ConnectionTestReport, HttpSettings, PreparedRequest};
pub use store::{ConfigStore, KeyValueStore};
pub use url_vars::{
    extract_url_variables, has_url_variables, replace_url_params, suggest_url_params,
    validate_url_params, UrlResolution,
};
