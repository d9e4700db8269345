//! Quick-defaults projection of extracted metadata.

use crate::model::{DefaultsMapping, FunctionMetadata, RValue};

/// Argument names reserved by the UI framework start with this prefix.
pub const RESERVED_PREFIX: &str = "moo";

pub const INPUT_PLACEHOLDER_ARG: &str = "moo_input_rds";
pub const OUTPUT_PLACEHOLDER_ARG: &str = "moo_output_rds";
pub const PLACEHOLDER_FILE: &str = "moo.rds";

pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

/// Build the argument name → default mapping.
///
/// Reserved-prefixed arguments are dropped. When the *first* argument is
/// reserved, the input and output placeholders are prepended; only the first
/// argument decides this.
pub fn project(meta: &FunctionMetadata) -> DefaultsMapping {
    let mut mapping = DefaultsMapping::default();
    if meta.args.first().is_some_and(|a| is_reserved(&a.name)) {
        mapping.push(INPUT_PLACEHOLDER_ARG, Some(RValue::string(PLACEHOLDER_FILE)));
        mapping.push(OUTPUT_PLACEHOLDER_ARG, Some(RValue::string(PLACEHOLDER_FILE)));
    }
    for arg in meta.args.iter().filter(|a| !is_reserved(&a.name)) {
        mapping.push(arg.name.clone(), arg.default.clone());
    }
    mapping
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArgDoc;
    use serde_json::json;

    fn meta(args: &[(&str, Option<RValue>)]) -> FunctionMetadata {
        FunctionMetadata {
            function_name: "f".into(),
            args: args
                .iter()
                .map(|(name, default)| ArgDoc {
                    name: name.to_string(),
                    default: default.clone(),
                    description: String::new(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn reserved_first_argument_injects_placeholders() {
        let m = meta(&[
            ("moo_input_rds", None),
            ("a", Some(RValue::double(5.0))),
            ("b", Some(RValue::string("foo"))),
        ]);
        let mapping = project(&m);
        assert_eq!(
            serde_json::to_value(&mapping).unwrap(),
            json!({"moo_input_rds": "moo.rds", "moo_output_rds": "moo.rds", "a": 5, "b": "foo"})
        );
        assert_eq!(
            mapping.keys().collect::<Vec<_>>(),
            ["moo_input_rds", "moo_output_rds", "a", "b"]
        );
    }

    #[test]
    fn reserved_argument_elsewhere_is_only_dropped() {
        let m = meta(&[
            ("a", Some(RValue::integer(1))),
            ("moo_plot_dir", Some(RValue::string("x"))),
            ("b", None),
        ]);
        let mapping = project(&m);
        assert_eq!(mapping.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(mapping.get("b"), Some(&None));
    }

    #[test]
    fn any_reserved_first_name_triggers_both_placeholders() {
        let m = meta(&[("moo_data", None), ("moo_other", None), ("x", None)]);
        let mapping = project(&m);
        assert_eq!(
            mapping.keys().collect::<Vec<_>>(),
            ["moo_input_rds", "moo_output_rds", "x"]
        );
    }

    #[test]
    fn empty_metadata_gives_empty_mapping() {
        assert!(project(&meta(&[])).is_empty());
    }
}
