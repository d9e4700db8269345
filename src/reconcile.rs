//! Template ↔ documentation reconciliation.
//!
//! The template owns UI placement (which role an argument lives in, widget
//! hints); the documentation owns text and defaults. Drift in either
//! direction is reported, never fatal.

use crate::markup::to_markdown;
use crate::model::*;
use std::collections::HashSet;

/// Argument-set drift found while reconciling one function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MismatchReport {
    /// Template keys with no documentation entry, in template order.
    pub template_only: Vec<String>,
    /// Documented arguments no template entry refers to, in documentation order.
    pub doc_only: Vec<String>,
}

impl MismatchReport {
    pub fn is_empty(&self) -> bool {
        self.template_only.is_empty() && self.doc_only.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub blueprint: Blueprint,
    pub report: MismatchReport,
}

/// Merge documentation content into the template's argument sections.
///
/// Entries without a documentation match are kept verbatim when
/// `keep_deprecated`, dropped otherwise. Documentation-only arguments are
/// never added.
pub fn reconcile(template: &Template, meta: &FunctionMetadata, keep_deprecated: bool) -> Reconciliation {
    let mut blueprint = Blueprint {
        title: to_markdown(&meta.title),
        description: to_markdown(&meta.description),
        r_function: template.r_function.clone(),
        columns: Vec::new(),
        input_datasets: Vec::new(),
        parameters: Vec::new(),
        outputs: template.outputs.clone(),
    };

    let mut matched: HashSet<&str> = HashSet::new();
    let mut report = MismatchReport::default();

    for role in Role::ALL {
        for entry in template.entries(role) {
            match meta.arg(entry.key()) {
                Some(arg) => {
                    matched.insert(entry.key());
                    blueprint.entries_mut(role).push(BlueprintEntry {
                        entry: entry.clone(),
                        doc: Some(InjectedDoc {
                            description: to_markdown(&arg.description),
                            default: arg.default.clone(),
                        }),
                    });
                }
                None => {
                    if !report.template_only.iter().any(|k| k == entry.key()) {
                        report.template_only.push(entry.key().to_string());
                    }
                    if keep_deprecated {
                        blueprint.entries_mut(role).push(BlueprintEntry {
                            entry: entry.clone(),
                            doc: None,
                        });
                    }
                }
            }
        }
    }

    report.doc_only = meta
        .arg_names()
        .filter(|name| !matched.contains(name))
        .map(str::to_string)
        .collect();

    log_report(&meta.function_name, &report);
    Reconciliation { blueprint, report }
}

fn log_report(function: &str, report: &MismatchReport) {
    if !report.template_only.is_empty() {
        log::warn!(
            "{}: template arguments missing from documentation: {}",
            function,
            report.template_only.join(", ")
        );
    }
    if !report.doc_only.is_empty() {
        log::warn!(
            "{}: documented arguments missing from template: {}",
            function,
            report.doc_only.join(", ")
        );
    }
}
