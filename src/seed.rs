//! Template seeding from legacy code templates.
//!
//! Legacy UI "code templates" name parameters after the old platform's
//! conventions. A mapping file ties each code template to the function it
//! wraps and renames its parameter keys to the function's argument names;
//! the result is a reconciler template.

use crate::error::{PipelineError, Result};
use crate::model::Role;
use crate::writer;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CODE_TEMPLATE_SUFFIX: &str = ".code-template.json";

#[derive(Debug, Deserialize)]
struct MappingFile {
    template_mappings: BTreeMap<String, TemplateMapping>,
}

/// How one code template maps onto a function.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateMapping {
    #[serde(default)]
    pub r_function: String,
    /// Each element maps old parameter keys to argument names.
    #[serde(default)]
    pub parameter_mappings: Vec<BTreeMap<String, String>>,
}

impl TemplateMapping {
    /// New name for `key`; the first mapping that mentions it wins.
    pub fn rename(&self, key: &str) -> Option<&str> {
        self.parameter_mappings
            .iter()
            .find_map(|m| m.get(key))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub mapping_path: PathBuf,
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Removed from every title, e.g. `" [CCBR]"`.
    pub strip_title: String,
}

/// Convert every code template in `source_dir`. Returns the written paths.
pub fn seed(config: &SeedConfig) -> Result<Vec<PathBuf>> {
    let mappings = load_mappings(&config.mapping_path)?;
    fs::create_dir_all(&config.output_dir).map_err(|e| PipelineError::io(&config.output_dir, e))?;

    let pattern = format!(
        "{}/*{}",
        glob::Pattern::escape(&config.source_dir.to_string_lossy()),
        CODE_TEMPLATE_SUFFIX
    );
    let mut sources: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| PipelineError::Configuration(format!("invalid glob pattern {}: {}", pattern, e)))?
        .filter_map(|r| r.ok())
        .collect();
    sources.sort();

    let mut written = Vec::new();
    for path in sources {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mapping = mappings.get(&name).cloned().unwrap_or_default();
        if mapping.r_function.is_empty() {
            log::warn!("{}: no function mapping, skipping", name);
            continue;
        }
        let code_template = read_object(&path)?;
        let template = convert(&path, &code_template, &mapping, &config.strip_title)?;
        let out = config.output_dir.join(format!("{}.json", mapping.r_function));
        writer::write(&template, &out)?;
        log::info!("{} -> {}", name, out.display());
        written.push(out);
    }
    Ok(written)
}

fn load_mappings(path: &Path) -> Result<BTreeMap<String, TemplateMapping>> {
    let content = fs::read_to_string(path).map_err(|e| {
        PipelineError::Configuration(format!("cannot read mapping file {}: {}", path.display(), e))
    })?;
    let file: MappingFile = serde_json::from_str(&content).map_err(|e| {
        PipelineError::Configuration(format!("invalid mapping file {}: {}", path.display(), e))
    })?;
    Ok(file.template_mappings)
}

fn read_object(path: &Path) -> Result<Map<String, Value>> {
    let content = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| PipelineError::InvalidTemplate {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Build a reconciler template from one code template.
pub fn convert(
    path: &Path,
    code_template: &Map<String, Value>,
    mapping: &TemplateMapping,
    strip_title: &str,
) -> Result<Value> {
    let invalid = |reason: &str| PipelineError::InvalidTemplate {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let title = code_template
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing string `title`"))?;
    let title = if strip_title.is_empty() {
        title.to_string()
    } else {
        title.replace(strip_title, "")
    };

    let mut out = Map::new();
    out.insert("title".into(), Value::String(title));
    out.insert(
        "description".into(),
        code_template.get("description").cloned().unwrap_or(Value::Null),
    );
    out.insert("r_function".into(), Value::String(mapping.r_function.clone()));

    for role in Role::ALL {
        let entries = match code_template.get(role.json_key()) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter().map(|item| rename_key(item, mapping)).collect(),
            Some(_) => return Err(invalid(&format!("`{}` is not an array", role.json_key()))),
        };
        out.insert(role.json_key().into(), Value::Array(entries));
    }
    Ok(Value::Object(out))
}

fn rename_key(item: &Value, mapping: &TemplateMapping) -> Value {
    let mut item = item.clone();
    let renamed = item
        .get("key")
        .and_then(Value::as_str)
        .and_then(|key| mapping.rename(key))
        .map(str::to_string);
    if let (Some(new_key), Some(fields)) = (renamed, item.as_object_mut()) {
        fields.insert("key".into(), Value::String(new_key));
    }
    item
}
