//! Output formatting for the CLI.

use clap::ValueEnum;
use serde::Serialize;

/// Output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print a value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: failed to encode output: {}", e),
    }
}

/// Print a success message.
pub fn print_success(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", message),
        OutputFormat::Json => {
            print_json(&serde_json::json!({ "status": "success", "message": message }));
        }
    }
}

/// Print an error message.
pub fn print_error(message: &str, format: &OutputFormat) {
    match format {
        OutputFormat::Text => eprintln!("Error: {}", message),
        OutputFormat::Json => {
            let body = serde_json::json!({ "status": "error", "message": message });
            eprintln!("{}", body);
        }
    }
}

/// Print a table row.
pub fn print_row(label: &str, value: &str) {
    println!("  {:<16} {}", format!("{}:", label), value);
}

/// Print a heading.
pub fn print_heading(text: &str) {
    println!("\n{}", text);
    println!("{}", "-".repeat(50));
}

/// `value`, or a dash when absent.
pub fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}
