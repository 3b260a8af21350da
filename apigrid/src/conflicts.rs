//! Detection of the same query key coming from several parameter sources,
//! and the first-wins merge used to build outbound requests.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::params::Parameter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyLocation {
    pub array_index: usize,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateDetail {
    pub count: usize,
    pub locations: Vec<KeyLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateReport {
    pub has_duplicates: bool,
    /// Duplicate keys in order of first appearance.
    pub duplicates: Vec<String>,
    /// Occurrences of each duplicate key.
    pub details: IndexMap<String, DuplicateDetail>,
}

/// Display names for the three sources checked by [`validate_param_conflicts`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLabels {
    pub test: String,
    pub default: String,
    pub pagination: String,
}

impl Default for SourceLabels {
    fn default() -> Self {
        Self {
            test: "Test parameters".to_string(),
            default: "Default query parameters".to_string(),
            pagination: "Pagination parameters".to_string(),
        }
    }
}

impl SourceLabels {
    fn by_index(&self, idx: usize) -> &str {
        match idx {
            0 => &self.test,
            1 => &self.default,
            2 => &self.pagination,
            _ => "unknown source",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConflictSources<'a> {
    pub test_params: &'a [Parameter],
    pub default_params: &'a [Parameter],
    pub pagination_params: &'a [Parameter],
    pub labels: &'a SourceLabels,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub duplicates: DuplicateReport,
}

impl ConflictValidation {
    /// # Errors
    /// Returns [`Error::Conflict`] listing every conflicting key.
    pub fn into_result(self) -> Result<Self> {
        if self.valid {
            Ok(self)
        } else {
            Err(Error::Conflict(self.errors.join("; ")))
        }
    }
}

/// Count enabled, non-blank keys across all `sources`; any key seen more than
/// once, in the same source or in different ones, is a duplicate.
#[must_use]
pub fn find_duplicate_keys(sources: &[&[Parameter]]) -> DuplicateReport {
    let mut seen: IndexMap<String, Vec<KeyLocation>> = IndexMap::new();
    for (array_index, params) in sources.iter().enumerate() {
        for p in *params {
            if let Some(key) = p.active_key() {
                seen.entry(key.to_string()).or_default().push(KeyLocation {
                    array_index,
                    value: p.value.clone(),
                });
            }
        }
    }

    let details: IndexMap<String, DuplicateDetail> = seen
        .into_iter()
        .filter(|(_, locations)| locations.len() > 1)
        .map(|(key, locations)| {
            (
                key,
                DuplicateDetail {
                    count: locations.len(),
                    locations,
                },
            )
        })
        .collect();

    DuplicateReport {
        has_duplicates: !details.is_empty(),
        duplicates: details.keys().cloned().collect(),
        details,
    }
}

/// Conflicts across the test, default and pagination sources, one error per
/// duplicate key naming every source and its value.
#[must_use]
pub fn validate_param_conflicts(sources: ConflictSources<'_>) -> ConflictValidation {
    let report = find_duplicate_keys(&[
        sources.test_params,
        sources.default_params,
        sources.pagination_params,
    ]);

    let errors: Vec<String> = report
        .details
        .iter()
        .map(|(key, detail)| {
            let places: Vec<String> = detail
                .locations
                .iter()
                .map(|loc| format!("{} (\"{}\")", sources.labels.by_index(loc.array_index), loc.value))
                .collect();
            format!(
                "Parameter \"{key}\" is defined more than once: {}",
                places.join(", ")
            )
        })
        .collect();

    let blank = [sources.test_params, sources.default_params, sources.pagination_params]
        .iter()
        .flat_map(|s| s.iter())
        .filter(|p| p.effective_key().is_none())
        .count();
    let warnings = if blank > 0 {
        vec![format!("{blank} parameter(s) with an empty key will be ignored")]
    } else {
        Vec::new()
    };

    if report.has_duplicates {
        tracing::debug!(keys = ?report.duplicates, "parameter conflicts found");
    }

    ConflictValidation {
        valid: errors.is_empty(),
        errors,
        warnings,
        duplicates: report,
    }
}

/// Merge sources in order; the first occurrence of a key wins, which is the
/// opposite tie-break of [`crate::params::to_object`].
#[must_use]
pub fn merge_params(sources: &[&[Parameter]]) -> Vec<Parameter> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for params in sources {
        for p in *params {
            if let Some(key) = p.active_key() {
                if seen.insert(key.to_string()) {
                    merged.push(Parameter::new(key, p.value.clone()));
                }
            }
        }
    }
    merged
}
