//! Function metadata extraction from the documentation database.

use crate::docdb::{Bindings, DocDatabase, Formal};
use crate::error::{PipelineError, Result};
use crate::model::{ArgDoc, FunctionMetadata, RValue};
use crate::resolve::{DefaultResolver, ExprResolver, Options};

/// The variadic catch-all parameter. Never part of extracted arguments.
pub const VARIADIC: &str = "...";

/// Evaluation settings for default expressions.
///
/// Passed explicitly into every extraction; nothing is read from process
/// state.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    /// Values visible to `getOption()` in default expressions.
    pub options: Options,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        let mut options = Options::new();
        options.insert("moo_print_plots".to_string(), RValue::logical(false));
        options.insert("moo_save_plots".to_string(), RValue::logical(true));
        options.insert("moo_plots_dir".to_string(), RValue::string("./figures"));
        ExtractOptions { options }
    }
}

/// Extract metadata for `function`, resolving defaults with [`ExprResolver`].
pub fn extract(function: &str, db: &DocDatabase, opts: &ExtractOptions) -> Result<FunctionMetadata> {
    extract_with(function, db, &ExprResolver::new(&opts.options))
}

/// Extract metadata for `function` with a caller-provided resolver.
pub fn extract_with(
    function: &str,
    db: &DocDatabase,
    resolver: &dyn DefaultResolver,
) -> Result<FunctionMetadata> {
    let record = db
        .record(function)
        .ok_or_else(|| PipelineError::DocumentationNotFound {
            function: function.to_string(),
        })?;
    let namespace = db.bindings_for(record);

    let description = format!(
        "{}\n\n{}",
        record.description.trim(),
        record.details.trim()
    )
    .trim()
    .to_string();

    let formals: Vec<&Formal> = record
        .formals
        .iter()
        .filter(|f| f.name != VARIADIC)
        .collect();
    // Without a signature the argument block is all there is to go on.
    let has_signature = !record.formals.is_empty();

    let mut args: Vec<ArgDoc> = Vec::new();
    for (names, text) in record.arguments.iter() {
        for name in split_names(names) {
            if name == VARIADIC || args.iter().any(|a| a.name == name) {
                continue;
            }
            let default = match formals.iter().find(|f| f.name == name) {
                Some(formal) => resolve_formal(function, formal, resolver, namespace),
                None if has_signature => {
                    log::warn!(
                        "{}: documented argument `{}` is not in the function signature",
                        function,
                        name
                    );
                    continue;
                }
                None => None,
            };
            args.push(ArgDoc {
                name: name.to_string(),
                default,
                description: text.trim().to_string(),
            });
        }
    }

    for formal in formals {
        if args.iter().any(|a| a.name == formal.name) {
            continue;
        }
        log::debug!("{}: argument `{}` has no documentation", function, formal.name);
        args.push(ArgDoc {
            name: formal.name.clone(),
            default: resolve_formal(function, formal, resolver, namespace),
            description: String::new(),
        });
    }

    Ok(FunctionMetadata {
        function_name: function.to_string(),
        title: record.title.trim().to_string(),
        description,
        args,
    })
}

/// `\item{x, y}{...}` documents several arguments at once.
fn split_names(names: &str) -> impl Iterator<Item = &str> {
    names.split(',').map(str::trim).filter(|n| !n.is_empty())
}

fn resolve_formal(
    function: &str,
    formal: &Formal,
    resolver: &dyn DefaultResolver,
    namespace: &Bindings,
) -> Option<RValue> {
    if let Some(value) = &formal.value {
        return Some(RValue::from_json(value));
    }
    let expr = formal.default.as_deref().map(str::trim)?;
    if expr.is_empty() {
        return None;
    }
    match resolver.resolve_default(expr, namespace) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!(
                "{}: cannot resolve default of `{}` ({}); keeping `{}` as text",
                function,
                formal.name,
                e,
                expr
            );
            Some(RValue::string(expr))
        }
    }
}
