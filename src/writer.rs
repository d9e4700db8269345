//! Canonical JSON output for blueprints and defaults.

use crate::error::{PipelineError, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Serialize to the canonical on-disk form: two-space pretty printing with a
/// trailing newline.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut out = serde_json::to_string_pretty(value)?;
    out.push('\n');
    Ok(out)
}

/// Serialize `value` and overwrite `path` with it.
pub fn write<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let content = to_json(value)?;
    write_str(&content, path)
}

/// Overwrite `path` with already-serialized content.
pub fn write_str(content: &str, path: &Path) -> Result<()> {
    fs::write(path, content).map_err(|e| PipelineError::io(path, e))
}
