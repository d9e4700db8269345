//! Batch driver: every template in a directory through the pipeline.

use crate::config::{BatchConfig, ErrorPolicy};
use crate::defaults;
use crate::docdb::DocDatabase;
use crate::error::{PipelineError, Result};
use crate::extract;
use crate::model::Template;
use crate::reconcile;
use crate::writer;
use std::fs;
use std::path::{Path, PathBuf};

/// A template that could not be turned into artifacts.
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: PipelineError,
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Function names whose artifacts were written, in processing order.
    pub written: Vec<String>,
    pub failures: Vec<FileFailure>,
    /// Number of functions with template/documentation drift.
    pub mismatched: usize,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run the pipeline over every `*.json` template in `config.input_dir`.
///
/// Configuration problems abort before any template is read. Per-template
/// failures follow `config.on_error`.
pub fn run(config: &BatchConfig) -> Result<BatchSummary> {
    let templates = list_templates(&config.input_dir)?;
    let db = DocDatabase::load(&config.docs_path)?;
    for dir in [&config.blueprints_dir, &config.defaults_dir] {
        fs::create_dir_all(dir).map_err(|e| {
            PipelineError::Configuration(format!(
                "cannot create output directory {}: {}",
                dir.display(),
                e
            ))
        })?;
    }
    log::debug!(
        "{} templates, {} documented functions",
        templates.len(),
        db.len()
    );

    let mut summary = BatchSummary::default();
    for path in templates {
        log::info!("processing {}", path.display());
        match process_file(&path, &db, config) {
            Ok(outcome) => {
                if outcome.mismatched {
                    summary.mismatched += 1;
                }
                summary.written.push(outcome.function);
            }
            Err(error) => {
                log::error!("{}: {}", path.display(), error);
                if config.on_error == ErrorPolicy::FailFast {
                    return Err(error);
                }
                summary.failures.push(FileFailure { path, error });
            }
        }
    }
    Ok(summary)
}

struct FileOutcome {
    function: String,
    mismatched: bool,
}

/// Process one template. Nothing is written unless both artifacts serialize.
fn process_file(path: &Path, db: &DocDatabase, config: &BatchConfig) -> Result<FileOutcome> {
    let template = load_template(path)?;
    let meta = extract::extract(&template.r_function, db, &config.extract)?;
    let mapping = defaults::project(&meta);
    let reconciled = reconcile::reconcile(&template, &meta, config.keep_deprecated);

    let defaults_json = writer::to_json(&mapping)?;
    let blueprint_json = writer::to_json(&reconciled.blueprint)?;

    let file_name = format!("{}.json", template.r_function);
    writer::write_str(&defaults_json, &config.defaults_dir.join(&file_name))?;
    writer::write_str(&blueprint_json, &config.blueprints_dir.join(&file_name))?;

    Ok(FileOutcome {
        function: template.r_function,
        mismatched: !reconciled.report.is_empty(),
    })
}

pub fn load_template(path: &Path) -> Result<Template> {
    let content = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    let template: Template =
        serde_json::from_str(&content).map_err(|e| PipelineError::InvalidTemplate {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    let invalid = |reason: String| PipelineError::InvalidTemplate {
        path: path.to_path_buf(),
        reason,
    };
    let name = template.r_function.trim();
    if name.is_empty() {
        return Err(invalid("empty `r_function`".to_string()));
    }
    // The function name becomes the output file name.
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(invalid(format!(
            "`r_function` {:?} is not a valid file name",
            template.r_function
        )));
    }
    Ok(template)
}

/// `*.json` files directly inside `dir`, in lexical order.
pub fn list_templates(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PipelineError::Configuration(format!(
            "template directory not found: {}",
            dir.display()
        )));
    }
    let pattern = format!("{}/*.json", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| {
            PipelineError::Configuration(format!("invalid glob pattern {}: {}", pattern, e))
        })?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file())
        .collect();
    // Sort for deterministic output
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    struct Fixture {
        root: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let root = TempDir::new().unwrap();
            fs::create_dir(root.path().join("templates")).unwrap();
            fs::write(
                root.path().join("docs.json"),
                json!({
                    "functions": {
                        "filter_counts": {
                            "title": "Filter counts",
                            "description": "Drop \\emph{low} counts.",
                            "arguments": {
                                "moo_input_rds": "Input object",
                                "min_count": "Minimum count",
                                "group_colname": "Group column",
                                "print_plots": "Print plots"
                            },
                            "formals": [
                                {"name": "moo_input_rds"},
                                {"name": "min_count", "default": "1"},
                                {"name": "group_colname", "default": "\"Group\""},
                                {"name": "print_plots", "default": "getOption(\"moo_print_plots\")"},
                                {"name": "..."}
                            ]
                        },
                        "apply_fn": {
                            "title": "Apply a function",
                            "arguments": {"moo_input_rds": "Input object", "fn": "Function to apply"},
                            "formals": [
                                {"name": "moo_input_rds"},
                                {"name": "fn", "default": "function(x) x"}
                            ]
                        }
                    }
                })
                .to_string(),
            )
            .unwrap();
            Fixture { root }
        }

        fn template(&self, name: &str, value: Value) {
            fs::write(self.root.path().join("templates").join(name), value.to_string()).unwrap();
        }

        fn config(&self) -> BatchConfig {
            let p = self.root.path();
            BatchConfig::new(
                p.join("templates"),
                p.join("docs.json"),
                p.join("out/blueprints"),
                p.join("out/defaults"),
            )
        }

        fn read(&self, rel: &str) -> Value {
            serde_json::from_str(&fs::read_to_string(self.root.path().join(rel)).unwrap()).unwrap()
        }
    }

    fn filter_counts_template() -> Value {
        json!({
            "title": "Filter Counts [CCBR]",
            "description": "stale",
            "r_function": "filter_counts",
            "columns": [{"key": "group_colname", "displayName": "Group"}],
            "inputDatasets": [{"key": "moo_input_rds", "paramType": "RDS"}],
            "parameters": [
                {"key": "min_count", "paramType": "NUMBER", "defaultValue": 99},
                {"key": "legacy_flag", "paramType": "BOOLEAN"}
            ],
            "outputs": {"moo_output_rds": {"type": "rds"}}
        })
    }

    #[test]
    fn writes_both_artifacts() {
        let fx = Fixture::new();
        fx.template("filter_counts.json", filter_counts_template());
        let summary = run(&fx.config()).unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.written, ["filter_counts"]);
        assert_eq!(summary.mismatched, 1);

        let defaults = fx.read("out/defaults/filter_counts.json");
        assert_eq!(
            defaults,
            json!({
                "moo_input_rds": "moo.rds",
                "moo_output_rds": "moo.rds",
                "min_count": 1,
                "group_colname": "Group",
                "print_plots": false
            })
        );

        let bp = fx.read("out/blueprints/filter_counts.json");
        assert_eq!(bp["title"], json!("Filter counts"));
        assert_eq!(bp["description"], json!("Drop *low* counts."));
        assert_eq!(bp["parameters"][0]["defaultValue"], json!(1));
        assert_eq!(bp["parameters"][0]["description"], json!("Minimum count"));
        assert_eq!(bp["parameters"][1], json!({"key": "legacy_flag", "paramType": "BOOLEAN"}));
        assert_eq!(bp["inputDatasets"][0]["defaultValue"], Value::Null);
        assert_eq!(bp["outputs"], json!({"moo_output_rds": {"type": "rds"}}));
    }

    #[test]
    fn missing_documentation_skips_only_that_file() {
        let fx = Fixture::new();
        fx.template("a.json", json!({"r_function": "nonexistent_fn"}));
        fx.template("b.json", filter_counts_template());
        let summary = run(&fx.config()).unwrap();
        assert_eq!(summary.written, ["filter_counts"]);
        assert_eq!(summary.failures.len(), 1);
        assert!(matches!(
            summary.failures[0].error,
            PipelineError::DocumentationNotFound { .. }
        ));
        assert!(!fx.root.path().join("out/defaults/nonexistent_fn.json").exists());
        assert!(!fx.root.path().join("out/blueprints/nonexistent_fn.json").exists());
    }

    #[test]
    fn fail_fast_stops_the_batch() {
        let fx = Fixture::new();
        fx.template("a.json", json!({"r_function": "nonexistent_fn"}));
        fx.template("b.json", filter_counts_template());
        let mut config = fx.config();
        config.on_error = ErrorPolicy::FailFast;
        let err = run(&config).unwrap_err();
        assert!(matches!(err, PipelineError::DocumentationNotFound { .. }));
        assert!(!fx.root.path().join("out/blueprints/filter_counts.json").exists());
    }

    #[test]
    fn invalid_template_is_a_file_failure() {
        let fx = Fixture::new();
        fs::write(fx.root.path().join("templates/broken.json"), "{ not json").unwrap();
        fx.template("missing_key.json", json!({"r_function": "filter_counts", "parameters": [{"label": "x"}]}));
        let summary = run(&fx.config()).unwrap();
        assert_eq!(summary.failures.len(), 2);
        assert!(summary
            .failures
            .iter()
            .all(|f| matches!(f.error, PipelineError::InvalidTemplate { .. })));
    }

    #[test]
    fn unserializable_default_fails_only_that_file() {
        let fx = Fixture::new();
        fx.template(
            "a_apply.json",
            json!({"r_function": "apply_fn", "parameters": [{"key": "fn"}]}),
        );
        fx.template("b_filter.json", filter_counts_template());
        let summary = run(&fx.config()).unwrap();

        assert_eq!(summary.failures.len(), 1);
        assert!(matches!(
            summary.failures[0].error,
            PipelineError::Serialization(_)
        ));
        assert!(!fx.root.path().join("out/defaults/apply_fn.json").exists());
        assert!(!fx.root.path().join("out/blueprints/apply_fn.json").exists());
        assert_eq!(summary.written, ["filter_counts"]);
        assert!(fx.root.path().join("out/blueprints/filter_counts.json").exists());
    }

    #[test]
    fn function_name_must_be_a_file_name() {
        let fx = Fixture::new();
        for name in ["../escape", "nested/fn", ".."] {
            fx.template("t.json", json!({"r_function": name}));
            let err = load_template(&fx.root.path().join("templates/t.json")).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidTemplate { .. }), "{}", name);
        }
        fx.template("t.json", json!({"r_function": "../escape"}));
        let summary = run(&fx.config()).unwrap();
        assert_eq!(summary.failures.len(), 1);
        assert!(!fx.root.path().join("out/escape.json").exists());
    }

    #[test]
    fn runs_are_idempotent() {
        let fx = Fixture::new();
        fx.template("filter_counts.json", filter_counts_template());
        run(&fx.config()).unwrap();
        let first = fs::read(fx.root.path().join("out/blueprints/filter_counts.json")).unwrap();
        run(&fx.config()).unwrap();
        let second = fs::read(fx.root.path().join("out/blueprints/filter_counts.json")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_input_directory_is_fatal() {
        let fx = Fixture::new();
        let mut config = fx.config();
        config.input_dir = fx.root.path().join("nope");
        assert!(run(&config).unwrap_err().is_fatal());
    }

    #[test]
    fn missing_database_is_fatal() {
        let fx = Fixture::new();
        let mut config = fx.config();
        config.docs_path = fx.root.path().join("nope.json");
        assert!(run(&config).unwrap_err().is_fatal());
    }

    #[test]
    fn only_json_files_in_lexical_order() {
        let fx = Fixture::new();
        let dir = fx.root.path().join("templates");
        for name in ["b.json", "a.json", "notes.txt", "c.json"] {
            fs::write(dir.join(name), "{}").unwrap();
        }
        let names: Vec<_> = list_templates(&dir)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["a.json", "b.json", "c.json"]);
    }
}
