//! Check command - store integrity and an offline syntax pass

use std::collections::HashMap;

use anyhow::{bail, Result};
use colored::Colorize;
use comfy_table::{Cell, Color};
use phaseline_core::migrations;
use phaseline_core::services::validate_syntax;
use serde::Serialize;

use crate::output;

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum Status {
    Pass,
    Warning,
    Error,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    check: String,
    status: Status,
    message: String,
}

impl CheckResult {
    fn new(check: impl Into<String>, status: Status, message: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            status,
            message: message.into(),
        }
    }
}

fn run_checks() -> Result<Vec<CheckResult>> {
    let phases = migrations::phases()?;
    let mut checks = Vec::new();

    let mut owners: HashMap<&str, u32> = HashMap::new();
    let mut duplicates = Vec::new();
    for phase in &phases {
        for unit in &phase.units {
            if let Some(first) = owners.insert(unit.name.as_str(), phase.id) {
                duplicates.push(format!("{} (phases {} and {})", unit.name, first, phase.id));
            }
        }
    }
    checks.push(if duplicates.is_empty() {
        CheckResult::new("unique_names", Status::Pass, format!("{} unit names", owners.len()))
    } else {
        CheckResult::new("unique_names", Status::Error, duplicates.join(", "))
    });

    let sequences: Vec<(&str, u32)> = phases
        .iter()
        .flat_map(|p| p.units.iter().map(|u| (u.name.as_str(), u.sequence)))
        .collect();
    let out_of_order: Vec<String> = sequences
        .windows(2)
        .filter(|w| w[1].1 <= w[0].1)
        .map(|w| format!("{} after {}", w[1].0, w[0].0))
        .collect();
    checks.push(if out_of_order.is_empty() {
        CheckResult::new("sequence_order", Status::Pass, "ascending across the chain")
    } else {
        CheckResult::new("sequence_order", Status::Error, out_of_order.join(", "))
    });

    // The parser does not know every PostgreSQL construct, so a parse
    // failure is only a warning; the database has the final word.
    for phase in &phases {
        for unit in &phase.units {
            checks.push(match validate_syntax(&unit.sql) {
                Ok(count) => CheckResult::new(
                    &unit.name,
                    Status::Pass,
                    format!("{} statement(s)", count),
                ),
                Err(e) => CheckResult::new(&unit.name, Status::Warning, e.to_string()),
            });
        }
    }

    Ok(checks)
}

pub fn run(json: bool) -> Result<()> {
    let checks = run_checks()?;
    let errors = checks
        .iter()
        .filter(|c| matches!(c.status, Status::Error))
        .count();
    let warnings = checks
        .iter()
        .filter(|c| matches!(c.status, Status::Warning))
        .count();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "checks": checks,
                "errors": errors,
                "warnings": warnings,
            }))?
        );
    } else {
        println!("{}", "Migration Store Check".bold());
        println!();

        let mut table = output::create_table();
        table.set_header(vec!["Check", "Status", "Message"]);
        for check in &checks {
            let status = match check.status {
                Status::Pass => Cell::new("PASS").fg(Color::Green),
                Status::Warning => Cell::new("WARN").fg(Color::Yellow),
                Status::Error => Cell::new("ERROR").fg(Color::Red),
            };
            table.add_row(vec![Cell::new(&check.check), status, Cell::new(&check.message)]);
        }
        println!("{}", table);
        println!();
        println!(
            "Summary: {} passed, {} warnings, {} errors",
            (checks.len() - errors - warnings).to_string().green(),
            warnings.to_string().yellow(),
            errors.to_string().red(),
        );
    }

    if errors > 0 {
        bail!("store check found {} error(s)", errors);
    }
    Ok(())
}
