//! Output formatting utilities

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use phaseline_core::PhaseResult;

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// One row per attempted unit of a phase
pub fn phase_table(result: &PhaseResult) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Unit", "Status", "Error"]);

    for unit in &result.results {
        let status = if unit.applied {
            Cell::new("APPLIED").fg(Color::Green)
        } else {
            Cell::new("FAILED").fg(Color::Red)
        };
        let error = match (&unit.error, unit.statement_index) {
            (Some(e), Some(i)) => format!("statement {}: {}", i, e),
            (Some(e), None) => e.clone(),
            (None, _) => String::new(),
        };
        table.add_row(vec![Cell::new(&unit.unit_name), status, Cell::new(error)]);
    }
    table
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
