//! Batch configuration: CLI values layered over an optional TOML file.
//!
//! ```toml
//! keep_deprecated = true
//! fail_fast = false
//!
//! [options]
//! moo_save_plots = false
//! moo_plots_dir = "./plots"
//! ```

use crate::docdb::Bindings;
use crate::error::{PipelineError, Result};
use crate::extract::ExtractOptions;
use crate::model::RValue;
use crate::resolve::{DefaultResolver, ExprResolver, Options};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// What to do when a single template cannot be processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Log, record the failure, move on to the next template.
    #[default]
    Continue,
    /// Stop the batch at the first failure.
    FailFast,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub input_dir: PathBuf,
    pub docs_path: PathBuf,
    pub blueprints_dir: PathBuf,
    pub defaults_dir: PathBuf,
    pub extract: ExtractOptions,
    pub keep_deprecated: bool,
    pub on_error: ErrorPolicy,
}

impl BatchConfig {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        docs_path: impl Into<PathBuf>,
        blueprints_dir: impl Into<PathBuf>,
        defaults_dir: impl Into<PathBuf>,
    ) -> Self {
        BatchConfig {
            input_dir: input_dir.into(),
            docs_path: docs_path.into(),
            blueprints_dir: blueprints_dir.into(),
            defaults_dir: defaults_dir.into(),
            extract: ExtractOptions::default(),
            keep_deprecated: true,
            on_error: ErrorPolicy::default(),
        }
    }
}

/// Settings file contents. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub options: BTreeMap<String, toml::Value>,
    pub keep_deprecated: Option<bool>,
    pub fail_fast: Option<bool>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            PipelineError::Configuration(format!("invalid settings {}: {}", path.display(), e))
        })
    }

    /// Layer these settings over `config`.
    pub fn apply(self, config: &mut BatchConfig) -> Result<()> {
        for (name, value) in self.options {
            let json = serde_json::to_value(&value).map_err(|e| {
                PipelineError::Configuration(format!("option `{}`: {}", name, e))
            })?;
            config.extract.options.insert(name, RValue::from_json(&json));
        }
        if let Some(keep) = self.keep_deprecated {
            config.keep_deprecated = keep;
        }
        if let Some(fail_fast) = self.fail_fast {
            config.on_error = if fail_fast {
                ErrorPolicy::FailFast
            } else {
                ErrorPolicy::Continue
            };
        }
        Ok(())
    }
}

/// Parse a `name=expr` option override.
///
/// The right-hand side is read as a default expression (`FALSE`, `"dir"`,
/// `c(1, 2)`); anything that does not evaluate is taken as a plain string.
pub fn parse_option(spec: &str) -> std::result::Result<(String, RValue), String> {
    let (name, expr) = spec
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{}`", spec))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty option name in `{}`", spec));
    }
    let options = Options::new();
    let value = ExprResolver::new(&options)
        .resolve_default(expr, &Bindings::new())
        .unwrap_or_else(|_| RValue::string(expr.trim()));
    Ok((name.to_string(), value))
}
