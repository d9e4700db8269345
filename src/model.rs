//! Data model shared by the extractor, projector, reconciler and writer.

use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Structured default value with R vector semantics.
///
/// Atomic vectors carry `None` for missing (NA) elements.
#[derive(Debug, Clone, PartialEq)]
pub enum RValue {
    Null,
    Logical(Vec<Option<bool>>),
    Integer(Vec<Option<i64>>),
    Double(Vec<Option<f64>>),
    Character(Vec<Option<String>>),
    /// Generic vector; elements may be named.
    List(Vec<(Option<String>, RValue)>),
    /// A closure default. Kept as source text, has no JSON projection.
    Function(String),
}

impl RValue {
    pub fn string(s: impl Into<String>) -> Self {
        RValue::Character(vec![Some(s.into())])
    }

    pub fn double(d: f64) -> Self {
        RValue::Double(vec![Some(d)])
    }

    pub fn integer(i: i64) -> Self {
        RValue::Integer(vec![Some(i)])
    }

    pub fn logical(b: bool) -> Self {
        RValue::Logical(vec![Some(b)])
    }

    /// Length in the R sense. `NULL` has length zero.
    pub fn len(&self) -> usize {
        match self {
            RValue::Null => 0,
            RValue::Logical(v) => v.len(),
            RValue::Integer(v) => v.len(),
            RValue::Double(v) => v.len(),
            RValue::Character(v) => v.len(),
            RValue::List(v) => v.len(),
            RValue::Function(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a value from plain JSON, as found in pre-materialized defaults
    /// and namespace bindings.
    ///
    /// Homogeneous scalar arrays become atomic vectors (with `null` as NA),
    /// anything else becomes a list.
    pub fn from_json(value: &Value) -> RValue {
        match value {
            Value::Null => RValue::Null,
            Value::Bool(b) => RValue::logical(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => RValue::integer(i),
                None => RValue::double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => RValue::string(s.clone()),
            Value::Array(items) => atomic_from_json(items).unwrap_or_else(|| {
                RValue::List(items.iter().map(|v| (None, RValue::from_json(v))).collect())
            }),
            Value::Object(map) => RValue::List(
                map.iter()
                    .map(|(k, v)| (Some(k.clone()), RValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn atomic_from_json(items: &[Value]) -> Option<RValue> {
    if items.is_empty() || items.iter().all(Value::is_null) {
        return None;
    }
    let present = || items.iter().filter(|v| !v.is_null());
    if present().all(Value::is_boolean) {
        return Some(RValue::Logical(items.iter().map(Value::as_bool).collect()));
    }
    if present().all(|v| v.is_i64()) {
        return Some(RValue::Integer(items.iter().map(Value::as_i64).collect()));
    }
    if present().all(Value::is_number) {
        return Some(RValue::Double(items.iter().map(Value::as_f64).collect()));
    }
    if present().all(Value::is_string) {
        return Some(RValue::Character(
            items.iter().map(|v| v.as_str().map(str::to_string)).collect(),
        ));
    }
    None
}

/// Largest magnitude at which every integer is exactly representable in f64.
const MAX_EXACT_F64: f64 = 9_007_199_254_740_992.0;

impl Serialize for RValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RValue::Null => serializer.serialize_unit(),
            RValue::Logical(v) => serialize_atomic(serializer, v, |s, b| s.serialize_bool(*b)),
            RValue::Integer(v) => serialize_atomic(serializer, v, |s, i| s.serialize_i64(*i)),
            RValue::Double(v) => serialize_atomic(serializer, v, serialize_double),
            RValue::Character(v) => serialize_atomic(serializer, v, |s, x| s.serialize_str(x)),
            RValue::List(items) if items.iter().any(|(name, _)| name.is_some()) => {
                let mut map = serializer.serialize_map(Some(items.len()))?;
                for (name, value) in items {
                    map.serialize_entry(name.as_deref().unwrap_or(""), value)?;
                }
                map.end()
            }
            RValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for (_, value) in items {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
            RValue::Function(src) => Err(S::Error::custom(format!(
                "function default `{}` has no JSON projection",
                src
            ))),
        }
    }
}

/// Wrapper so a single atomic element can be fed to `serialize_element`.
struct Element<'a, T, F>(&'a Option<T>, &'a F);

impl<T, F> Serialize for Element<'_, T, F>
where
    F: Fn(serde_json::value::Serializer, &T) -> serde_json::Result<Value>,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            None => serializer.serialize_unit(),
            Some(x) => (self.1)(serde_json::value::Serializer, x)
                .map_err(S::Error::custom)?
                .serialize(serializer),
        }
    }
}

/// Length-1 vectors are unboxed to a bare scalar; NA becomes `null`.
fn serialize_atomic<S, T, F>(serializer: S, values: &[Option<T>], f: F) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    F: Fn(serde_json::value::Serializer, &T) -> serde_json::Result<Value>,
{
    if values.len() == 1 {
        return Element(&values[0], &f).serialize(serializer);
    }
    let mut seq = serializer.serialize_seq(Some(values.len()))?;
    for value in values {
        seq.serialize_element(&Element(value, &f))?;
    }
    seq.end()
}

fn serialize_double(s: serde_json::value::Serializer, d: &f64) -> serde_json::Result<Value> {
    if !d.is_finite() {
        return Err(serde_json::Error::custom(format!(
            "non-finite number {} has no JSON projection",
            d
        )));
    }
    if d.fract() == 0.0 && d.abs() < MAX_EXACT_F64 {
        return s.serialize_i64(*d as i64);
    }
    s.serialize_f64(*d)
}

/// Documentation for one formal argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgDoc {
    pub name: String,
    /// `None` when the formal has no default expression.
    pub default: Option<RValue>,
    pub description: String,
}

/// Documentation content for one function, as extracted from the database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionMetadata {
    pub function_name: String,
    pub title: String,
    pub description: String,
    /// In documentation order, without the variadic `...`.
    pub args: Vec<ArgDoc>,
}

impl FunctionMetadata {
    pub fn arg(&self, name: &str) -> Option<&ArgDoc> {
        self.args.iter().find(|a| a.name == name)
    }

    pub fn arg_names(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|a| a.name.as_str())
    }
}

/// UI role an argument is surfaced under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Columns,
    InputDatasets,
    Parameters,
}

impl Role {
    /// Processing order for reconciliation.
    pub const ALL: [Role; 3] = [Role::Columns, Role::InputDatasets, Role::Parameters];

    pub fn json_key(self) -> &'static str {
        match self {
            Role::Columns => "columns",
            Role::InputDatasets => "inputDatasets",
            Role::Parameters => "parameters",
        }
    }
}

/// One argument entry of a template role sequence.
///
/// Only `key` is interpreted; every other field is carried through in its
/// original order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct ArgumentEntry {
    key: String,
    fields: Map<String, Value>,
}

impl ArgumentEntry {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl TryFrom<Map<String, Value>> for ArgumentEntry {
    type Error = String;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        match fields.get("key") {
            Some(Value::String(key)) => Ok(ArgumentEntry {
                key: key.clone(),
                fields,
            }),
            Some(other) => Err(format!("argument `key` must be a string, got {}", other)),
            None => Err("argument entry without `key`".to_string()),
        }
    }
}

impl Serialize for ArgumentEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Hand-authored template for one function.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Template {
    pub r_function: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<ArgumentEntry>,
    #[serde(default, rename = "inputDatasets")]
    pub input_datasets: Vec<ArgumentEntry>,
    #[serde(default)]
    pub parameters: Vec<ArgumentEntry>,
    #[serde(default = "empty_object")]
    pub outputs: Value,
}

impl Template {
    pub fn entries(&self, role: Role) -> &[ArgumentEntry] {
        match role {
            Role::Columns => &self.columns,
            Role::InputDatasets => &self.input_datasets,
            Role::Parameters => &self.parameters,
        }
    }
}

/// Documentation content injected into a matched entry.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectedDoc {
    /// Already converted to markdown.
    pub description: String,
    pub default: Option<RValue>,
}

/// A template entry as it appears in a blueprint.
#[derive(Debug, Clone, PartialEq)]
pub struct BlueprintEntry {
    pub entry: ArgumentEntry,
    /// `None` for entries kept without a documentation match.
    pub doc: Option<InjectedDoc>,
}

impl BlueprintEntry {
    pub fn key(&self) -> &str {
        self.entry.key()
    }
}

impl Serialize for BlueprintEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let Some(doc) = &self.doc else {
            return self.entry.serialize(serializer);
        };
        let fields = self.entry.fields();
        let extra = usize::from(!fields.contains_key("description"))
            + usize::from(!fields.contains_key("defaultValue"));
        let mut map = serializer.serialize_map(Some(fields.len() + extra))?;
        // Overwrite in place so the template's field order survives.
        for (name, value) in fields {
            match name.as_str() {
                "description" => map.serialize_entry(name, &doc.description)?,
                "defaultValue" => map.serialize_entry(name, &doc.default)?,
                _ => map.serialize_entry(name, value)?,
            }
        }
        if !fields.contains_key("description") {
            map.serialize_entry("description", &doc.description)?;
        }
        if !fields.contains_key("defaultValue") {
            map.serialize_entry("defaultValue", &doc.default)?;
        }
        map.end()
    }
}

/// Reconciled, UI-ready description of a function's parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Blueprint {
    pub title: String,
    pub description: String,
    pub r_function: String,
    pub columns: Vec<BlueprintEntry>,
    #[serde(rename = "inputDatasets")]
    pub input_datasets: Vec<BlueprintEntry>,
    pub parameters: Vec<BlueprintEntry>,
    pub outputs: Value,
}

impl Blueprint {
    pub fn entries(&self, role: Role) -> &[BlueprintEntry] {
        match role {
            Role::Columns => &self.columns,
            Role::InputDatasets => &self.input_datasets,
            Role::Parameters => &self.parameters,
        }
    }

    pub(crate) fn entries_mut(&mut self, role: Role) -> &mut Vec<BlueprintEntry> {
        match role {
            Role::Columns => &mut self.columns,
            Role::InputDatasets => &mut self.input_datasets,
            Role::Parameters => &mut self.parameters,
        }
    }

    /// Keys across all roles, in role order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        Role::ALL
            .into_iter()
            .flat_map(move |role| self.entries(role).iter().map(BlueprintEntry::key))
    }
}

/// Ordered argument name → default value mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultsMapping {
    entries: Vec<(String, Option<RValue>)>,
}

impl DefaultsMapping {
    pub fn push(&mut self, name: impl Into<String>, value: Option<RValue>) {
        self.entries.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Option<RValue>> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for DefaultsMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn singleton_vectors_are_unboxed() {
        assert_eq!(serde_json::to_value(RValue::double(5.0)).unwrap(), json!(5));
        assert_eq!(serde_json::to_value(RValue::string("foo")).unwrap(), json!("foo"));
        assert_eq!(
            serde_json::to_value(RValue::Character(vec![Some("a".into()), Some("b".into())]))
                .unwrap(),
            json!(["a", "b"])
        );
    }

    #[test]
    fn missing_elements_become_null() {
        assert_eq!(serde_json::to_value(RValue::Logical(vec![None])).unwrap(), json!(null));
        assert_eq!(
            serde_json::to_value(RValue::Integer(vec![Some(1), None])).unwrap(),
            json!([1, null])
        );
    }

    #[test]
    fn fractional_doubles_stay_fractional() {
        assert_eq!(serde_json::to_value(RValue::double(0.05)).unwrap(), json!(0.05));
    }

    #[test]
    fn named_list_becomes_object() {
        let value = RValue::List(vec![
            (Some("a".into()), RValue::integer(1)),
            (Some("b".into()), RValue::Character(vec![])),
        ]);
        assert_eq!(serde_json::to_value(value).unwrap(), json!({"a": 1, "b": []}));
    }

    #[test]
    fn functions_have_no_projection() {
        let err = serde_json::to_string(&RValue::Function("function(x) x".into())).unwrap_err();
        assert!(err.to_string().contains("no JSON projection"));
    }

    #[test]
    fn non_finite_doubles_have_no_projection() {
        assert!(serde_json::to_string(&RValue::double(f64::INFINITY)).is_err());
    }

    #[test]
    fn from_json_builds_atomic_vectors() {
        assert_eq!(
            RValue::from_json(&json!(["x", null])),
            RValue::Character(vec![Some("x".into()), None])
        );
        assert_eq!(
            RValue::from_json(&json!([1, 2.5])),
            RValue::Double(vec![Some(1.0), Some(2.5)])
        );
        assert!(matches!(RValue::from_json(&json!([1, "a"])), RValue::List(_)));
    }

    #[test]
    fn entry_requires_string_key() {
        let ok: ArgumentEntry = serde_json::from_value(json!({"key": "x", "label": "X"})).unwrap();
        assert_eq!(ok.key(), "x");
        assert!(serde_json::from_value::<ArgumentEntry>(json!({"label": "X"})).is_err());
        assert!(serde_json::from_value::<ArgumentEntry>(json!({"key": 3})).is_err());
    }

    #[test]
    fn injected_doc_overwrites_in_place() {
        let entry: ArgumentEntry = serde_json::from_value(json!({
            "key": "x",
            "defaultValue": "stale",
            "label": "X"
        }))
        .unwrap();
        let bp = BlueprintEntry {
            entry,
            doc: Some(InjectedDoc {
                description: "fresh".into(),
                default: Some(RValue::logical(true)),
            }),
        };
        let out = serde_json::to_string(&bp).unwrap();
        assert_eq!(
            out,
            r#"{"key":"x","defaultValue":true,"label":"X","description":"fresh"}"#
        );
    }

    #[test]
    fn template_defaults_missing_sections() {
        let t: Template = serde_json::from_value(json!({"r_function": "f"})).unwrap();
        assert!(t.columns.is_empty() && t.input_datasets.is_empty() && t.parameters.is_empty());
        assert_eq!(t.outputs, json!({}));
    }
}
