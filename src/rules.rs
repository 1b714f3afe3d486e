//! Validation contracts and the per-dataset override registry.
//!
//! A rule source is a YAML or JSON mapping of dataset name to a partial
//! override:
//!
//! ```yaml
//! gdp:
//!   index_column: year
//!   value_columns: [gdp, gdp_per_capita]
//! legacy_prices:
//!   monotonic_index: false
//!   no_outliers: false
//! ```
//!
//! Every entry starts from [`Rule::default`] and only the keys present in
//! the entry are changed. Unknown keys are a configuration error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_INDEX_COLUMN: &str = "year";
pub const DEFAULT_VALUE_COLUMN: &str = "value";

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// Which checks run against a dataset and on which columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    index_column: String,
    value_columns: Vec<String>,
    pub index_is_year: bool,
    pub unique_index: bool,
    pub monotonic_index: bool,
    pub required_columns: bool,
    pub no_nulls: bool,
    pub numeric_type: bool,
    pub no_gaps: bool,
    pub no_outliers: bool,
}

impl Default for Rule {
    fn default() -> Self {
        Rule {
            index_column: DEFAULT_INDEX_COLUMN.to_string(),
            value_columns: vec![DEFAULT_VALUE_COLUMN.to_string()],
            index_is_year: true,
            unique_index: true,
            monotonic_index: true,
            required_columns: true,
            no_nulls: true,
            numeric_type: true,
            no_gaps: true,
            no_outliers: true,
        }
    }
}

/// The contract applied to any dataset without an override.
pub fn default_rule() -> Rule {
    Rule::default()
}

impl Rule {
    pub fn index_column(&self) -> &str {
        &self.index_column
    }

    /// Required value columns, in declaration order, without duplicates.
    pub fn value_columns(&self) -> &[String] {
        &self.value_columns
    }
}

// ---------------------------------------------------------------------------
// RuleOverride – a partial rule as written in the source document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleOverride {
    pub index_column: Option<String>,
    pub value_columns: Option<Vec<String>>,
    pub index_is_year: Option<bool>,
    pub unique_index: Option<bool>,
    pub monotonic_index: Option<bool>,
    pub required_columns: Option<bool>,
    pub no_nulls: Option<bool>,
    pub numeric_type: Option<bool>,
    pub no_gaps: Option<bool>,
    pub no_outliers: Option<bool>,
}

impl RuleOverride {
    /// Merge the present fields onto `base`.
    pub fn apply(self, dataset: &str, mut base: Rule) -> Result<Rule, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidOverride {
            dataset: dataset.to_string(),
            reason: reason.to_string(),
        };

        if let Some(index) = self.index_column {
            if index.trim().is_empty() {
                return Err(invalid("index_column is empty"));
            }
            base.index_column = index;
        }
        if let Some(columns) = self.value_columns {
            let mut deduped: Vec<String> = Vec::with_capacity(columns.len());
            for col in columns {
                if col.trim().is_empty() {
                    return Err(invalid("value_columns contains an empty name"));
                }
                if !deduped.contains(&col) {
                    deduped.push(col);
                }
            }
            base.value_columns = deduped;
        }

        let toggles = [
            (self.index_is_year, &mut base.index_is_year),
            (self.unique_index, &mut base.unique_index),
            (self.monotonic_index, &mut base.monotonic_index),
            (self.required_columns, &mut base.required_columns),
            (self.no_nulls, &mut base.no_nulls),
            (self.numeric_type, &mut base.numeric_type),
            (self.no_gaps, &mut base.no_gaps),
            (self.no_outliers, &mut base.no_outliers),
        ];
        for (value, slot) in toggles {
            if let Some(v) = value {
                *slot = v;
            }
        }

        Ok(base)
    }
}

// ---------------------------------------------------------------------------
// Rule source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Yaml,
    Json,
}

/// Where overrides come from.
#[derive(Debug, Clone)]
pub enum RuleSource {
    File(PathBuf),
    Inline { format: SourceFormat, text: String },
}

impl RuleSource {
    fn read(&self) -> Result<(SourceFormat, String), ConfigError> {
        match self {
            RuleSource::Inline { format, text } => Ok((*format, text.clone())),
            RuleSource::File(path) => {
                let format = format_for(path)?;
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                Ok((format, text))
            }
        }
    }
}

fn format_for(path: &Path) -> Result<SourceFormat, ConfigError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "yaml" | "yml" => Ok(SourceFormat::Yaml),
        "json" => Ok(SourceFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Dataset name → Rule, falling back to the default rule on a miss.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    rules: BTreeMap<String, Rule>,
    fallback: Rule,
}

impl Registry {
    /// The rule for `dataset`, or the default rule.
    pub fn rule_for(&self, dataset: &str) -> &Rule {
        self.rules.get(dataset).unwrap_or(&self.fallback)
    }

    pub fn contains(&self, dataset: &str) -> bool {
        self.rules.contains_key(dataset)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Build the registry from an optional source. A missing source or an
/// empty document yields an empty registry; anything malformed fails the
/// whole load.
pub fn load_registry(source: Option<&RuleSource>) -> Result<Registry, ConfigError> {
    let Some(source) = source else {
        debug!("no rule source given, every dataset uses the default rule");
        return Ok(Registry::default());
    };

    let (format, text) = source.read()?;
    let overrides: Option<BTreeMap<String, RuleOverride>> = if text.trim().is_empty() {
        None
    } else {
        match format {
            SourceFormat::Yaml => serde_yaml::from_str(&text)?,
            SourceFormat::Json => serde_json::from_str(&text)?,
        }
    };

    let mut rules = BTreeMap::new();
    for (name, over) in overrides.unwrap_or_default() {
        let rule = over.apply(&name, default_rule())?;
        rules.insert(name, rule);
    }

    info!("loaded {} rule override(s)", rules.len());
    Ok(Registry {
        rules,
        fallback: default_rule(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> RuleSource {
        RuleSource::Inline {
            format: SourceFormat::Yaml,
            text: text.to_string(),
        }
    }

    #[test]
    fn default_rule_enables_everything() {
        let rule = default_rule();
        assert_eq!(rule.index_column(), "year");
        assert_eq!(rule.value_columns(), ["value".to_string()]);
        assert!(
            rule.index_is_year
                && rule.unique_index
                && rule.monotonic_index
                && rule.required_columns
                && rule.no_nulls
                && rule.numeric_type
                && rule.no_gaps
                && rule.no_outliers
        );
    }

    #[test]
    fn absent_or_empty_source_gives_empty_registry() {
        assert!(load_registry(None).unwrap().is_empty());
        assert!(load_registry(Some(&yaml("   \n"))).unwrap().is_empty());
        assert!(load_registry(Some(&yaml("~"))).unwrap().is_empty());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let registry = load_registry(Some(&yaml(
            "gdp:\n  value_columns: [gdp, gdp, pop]\n  no_gaps: false\n",
        )))
        .unwrap();

        let rule = registry.rule_for("gdp");
        assert_eq!(rule.index_column(), "year");
        assert_eq!(rule.value_columns(), ["gdp".to_string(), "pop".to_string()]);
        assert!(!rule.no_gaps);
        assert!(rule.no_outliers);
    }

    #[test]
    fn lookup_miss_uses_default() {
        let registry = load_registry(Some(&yaml("gdp:\n  index_column: yr\n"))).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains("co2"));
        assert_eq!(registry.rule_for("co2"), &default_rule());
        assert_eq!(registry.rule_for("gdp").index_column(), "yr");
    }

    #[test]
    fn unknown_key_is_a_config_error() {
        let err = load_registry(Some(&yaml("gdp:\n  no_nul: false\n"))).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn unparsable_json_is_a_config_error() {
        let source = RuleSource::Inline {
            format: SourceFormat::Json,
            text: "{\"gdp\": ".to_string(),
        };
        assert!(matches!(load_registry(Some(&source)), Err(ConfigError::Json(_))));
    }

    #[test]
    fn empty_index_name_is_rejected() {
        let err = load_registry(Some(&yaml("gdp:\n  index_column: ''\n"))).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }

    #[test]
    fn file_source_dispatches_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, r#"{"co2": {"no_outliers": false}}"#).unwrap();
        let registry = load_registry(Some(&RuleSource::File(path))).unwrap();
        assert!(!registry.rule_for("co2").no_outliers);

        let toml = dir.path().join("rules.toml");
        std::fs::write(&toml, "").unwrap();
        assert!(matches!(
            load_registry(Some(&RuleSource::File(toml))),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
