//! Read-only documentation database.
//!
//! The database is a single JSON file produced by the documentation build:
//! function records keyed by name, plus per-namespace bindings used when
//! default expressions refer to package constants.

use crate::error::{PipelineError, Result};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Names bound in a function's defining namespace.
pub type Bindings = BTreeMap<String, Value>;

static NO_BINDINGS: Bindings = BTreeMap::new();

#[derive(Debug, Default, Deserialize)]
pub struct DocDatabase {
    #[serde(default)]
    namespaces: BTreeMap<String, Bindings>,
    #[serde(default)]
    functions: BTreeMap<String, DocRecord>,
}

/// Raw documentation record for one function.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocRecord {
    /// Defining namespace, for resolving names in default expressions.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: String,
    /// Argument documentation block, in documentation order.
    #[serde(default)]
    pub arguments: ArgTable,
    /// Formal parameters, in signature order.
    #[serde(default)]
    pub formals: Vec<Formal>,
}

/// A formal parameter and its default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Formal {
    pub name: String,
    /// Unevaluated default expression source.
    #[serde(default)]
    pub default: Option<String>,
    /// Default already materialized by the documentation build.
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Value>,
}

/// Distinguishes `"value": null` (a materialized NULL) from an absent field.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Ordered argument name → description table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgTable(pub Vec<(String, String)>);

impl ArgTable {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, d)| (n.as_str(), d.as_str()))
    }
}

impl<'de> Deserialize<'de> for ArgTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ArgTableVisitor;

        impl<'de> Visitor<'de> for ArgTableVisitor {
            type Value = ArgTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of argument names to descriptions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<ArgTable, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, description)) =
                    access.next_entry::<String, Option<String>>()?
                {
                    entries.push((name, description.unwrap_or_default()));
                }
                Ok(ArgTable(entries))
            }
        }

        deserializer.deserialize_map(ArgTableVisitor)
    }
}

impl DocDatabase {
    /// Load the database file. Any failure here is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!(
                "cannot read documentation database {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content).map_err(|e| {
            PipelineError::Configuration(format!(
                "malformed documentation database {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    pub fn record(&self, function: &str) -> Option<&DocRecord> {
        self.functions.get(function)
    }

    /// Bindings of the record's namespace, empty when unknown.
    pub fn bindings_for(&self, record: &DocRecord) -> &Bindings {
        record
            .namespace
            .as_deref()
            .and_then(|ns| self.namespaces.get(ns))
            .unwrap_or(&NO_BINDINGS)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn insert(&mut self, name: impl Into<String>, record: DocRecord) {
        self.functions.insert(name.into(), record);
    }

    pub fn bind(&mut self, namespace: impl Into<String>, name: impl Into<String>, value: Value) {
        self.namespaces
            .entry(namespace.into())
            .or_default()
            .insert(name.into(), value);
    }
}
