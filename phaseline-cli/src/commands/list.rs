//! List command - show the embedded migration store

use anyhow::Result;
use colored::Colorize;
use comfy_table::Cell;
use phaseline_core::migrations;

use crate::output;

pub fn run(phase: Option<u32>, json: bool) -> Result<()> {
    let phases = match phase {
        Some(id) => vec![migrations::phase(id)?],
        None => migrations::phases()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&phases)?);
        return Ok(());
    }

    for phase in &phases {
        let predecessor = phase
            .predecessor
            .map(|p| format!("after phase {}", p))
            .unwrap_or_else(|| "first".to_string());
        println!(
            "{} {} ({})",
            format!("Phase {}", phase.id).bold(),
            phase.name,
            predecessor.dimmed()
        );

        let mut table = output::create_table();
        table.set_header(vec!["Seq", "Unit", "Size"]);
        for unit in &phase.units {
            table.add_row(vec![
                Cell::new(unit.sequence),
                Cell::new(&unit.name),
                Cell::new(output::format_size(unit.sql.len() as u64)),
            ]);
        }
        println!("{}", table);
        println!();
    }

    let total: usize = phases.iter().map(|p| p.units.len()).sum();
    output::info(&format!("{} unit(s) in {} phase(s)", total, phases.len()));
    Ok(())
}
