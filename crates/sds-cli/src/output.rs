//! Output formatting utilities.

use std::collections::BTreeMap;

use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::config::OutputFormat;

/// Prints a success message.
pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Prints an error message.
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Prints a warning message.
pub fn warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Prints an info message.
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// One attribute of a query result.
#[derive(Debug, Tabled, Serialize)]
pub struct AttributeRow {
    /// Attribute name.
    #[tabled(rename = "Attribute")]
    pub attribute: String,
    /// Attribute value.
    #[tabled(rename = "Value")]
    pub value: String,
}

/// Outputs rows in the specified format.
pub fn output<T: Tabled + Serialize>(data: &[T], format: OutputFormat) -> crate::CliResult<()> {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                info("No results found.");
            } else {
                println!("{}", render_table(data));
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(data)?);
        }
    }
    Ok(())
}

/// Outputs a query result, or a notice when there is none.
pub fn output_attributes(
    result: Option<&BTreeMap<String, String>>,
    format: OutputFormat,
) -> crate::CliResult<()> {
    match (result, format) {
        (None, OutputFormat::Table) => info("No entries matched."),
        (None, OutputFormat::Json) => println!("null"),
        (Some(attrs), OutputFormat::Table) => output(&attribute_rows(attrs), format)?,
        (Some(attrs), OutputFormat::Json) => println!("{}", serde_json::to_string_pretty(attrs)?),
    }
    Ok(())
}

fn attribute_rows(attrs: &BTreeMap<String, String>) -> Vec<AttributeRow> {
    attrs
        .iter()
        .map(|(attribute, value)| AttributeRow {
            attribute: attribute.clone(),
            value: value.clone(),
        })
        .collect()
}

fn render_table<T: Tabled>(data: &[T]) -> String {
    Table::new(data).with(Style::rounded()).to_string()
}
