// Output formatting utilities for CLI
use colored::*;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    Table,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// Parse output format from string
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Render rows as a table or pretty JSON.
pub fn render_list<T>(data: &[T], format: OutputFormat) -> anyhow::Result<String>
where
    T: Tabled + Serialize,
{
    match format {
        OutputFormat::Table => Ok(Table::new(data).with(Style::rounded()).to_string()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
    }
}

/// Print a list of rows in the specified format
pub fn print_list<T>(data: &[T], format: OutputFormat) -> anyhow::Result<()>
where
    T: Tabled + Serialize,
{
    if data.is_empty() && format == OutputFormat::Table {
        println!("{}", "No subscribers registered".yellow());
        return Ok(());
    }
    println!("{}", render_list(data, format)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message.yellow());
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}
