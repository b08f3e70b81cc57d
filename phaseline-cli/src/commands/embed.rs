//! Embed command - splice SQL files into a runner artifact

use std::path::PathBuf;

use anyhow::Result;
use phaseline_core::services::embed;
use phaseline_core::{EmbedRequest, EmbedSyntax, LogEvent};

use super::{get_config, get_logger, log_event};
use crate::output;

pub fn run(
    target: PathBuf,
    names: Vec<String>,
    source_dir: Option<PathBuf>,
    syntax: &str,
    json: bool,
) -> Result<()> {
    let syntax: EmbedSyntax = syntax.parse()?;
    let source_dir = match source_dir {
        Some(dir) => Some(dir),
        None => get_config()?.sql_dir,
    };

    let request = EmbedRequest {
        names,
        source_dir,
        target,
        syntax,
    };

    let logger = get_logger();
    let report = match embed(&request) {
        Ok(report) => report,
        Err(e) => {
            log_event(
                &logger,
                LogEvent::new("embed_failed")
                    .with_command("embed")
                    .with_error(e.to_string()),
            );
            return Err(e.into());
        }
    };
    if let Some(l) = &logger {
        let _ = l.record_embed(&report);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for name in &report.skipped {
        output::warning(&format!("Skipped {}: source file not found", name));
    }
    if report.embedded.is_empty() {
        output::warning("Nothing embedded");
    } else {
        output::success(&format!(
            "Embedded {} unit(s) into {}: {}",
            report.embedded.len(),
            request.target.display(),
            report.embedded.join(", ")
        ));
    }
    Ok(())
}
