//! Report generation.

pub mod generator;

pub use generator::{format_validation_report, generate_json_report, generate_markdown_report};
