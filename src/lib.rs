//! blueprint-gen — reconcile hand-written tool templates with function
//! documentation.
//!
//! For every template the pipeline extracts the documented title,
//! description, argument descriptions and defaults of the function it wraps,
//! merges them into the template's argument sections and writes two
//! artifacts: a defaults file (argument → default) and a blueprint (the
//! UI-oriented schema consumed by the tool-definition generator).

pub mod batch;
pub mod config;
pub mod defaults;
pub mod docdb;
pub mod error;
pub mod extract;
pub mod markup;
pub mod model;
pub mod reconcile;
pub mod resolve;
pub mod seed;
pub mod writer;

pub use error::{PipelineError, Result};
