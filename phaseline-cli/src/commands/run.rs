//! Run command - apply migrations against the configured database

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Result};
use colored::Colorize;
use phaseline_core::services::new_run_id;
use phaseline_core::{
    Invocation, InvocationOutcome, LogEvent, MigrationService, OperationResult, StatementMode,
};

use super::{block_on, get_config, get_logger, log_event};
use crate::output;

pub fn run(
    phase: Option<u32>,
    single: bool,
    predecessors_applied: bool,
    policy: Option<&str>,
    per_statement: bool,
    timeout: Option<u64>,
    json: bool,
) -> Result<()> {
    let mut config = get_config()?;
    if let Some(policy) = policy {
        config.run_options.failure_policy = policy.parse()?;
    }
    if per_statement {
        config.run_options.statement_mode = StatementMode::PerStatement;
    }
    if let Some(secs) = timeout {
        if secs == 0 {
            bail!("--timeout must be at least one second");
        }
        config.run_options.unit_timeout = Some(Duration::from_secs(secs));
    }

    let service = MigrationService::from_config(&config)?;
    let invocation = Invocation {
        phase,
        single,
        predecessors_applied,
    };

    let logger = get_logger();
    let run_id = new_run_id();
    let mut started = LogEvent::new("run_started")
        .with_run_id(&run_id)
        .with_command("run");
    if let Some(phase) = phase {
        started = started.with_phase(phase);
    }
    log_event(&logger, started);

    let outcome = match block_on(service.run(&invocation))? {
        Ok(outcome) => outcome,
        Err(e) => {
            log_event(
                &logger,
                LogEvent::new("run_failed")
                    .with_run_id(&run_id)
                    .with_command("run")
                    .with_error(e.to_string()),
            );
            if json {
                let context = HashMap::from([("run_id".to_string(), serde_json::json!(run_id))]);
                let failure = OperationResult::<()>::fail_with_context(e.to_string(), context);
                println!("{}", serde_json::to_string_pretty(&failure)?);
            }
            return Err(e.into());
        }
    };
    if let Some(l) = &logger {
        let _ = l.record_outcome(&run_id, &outcome);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome, &config.run_options.failure_policy.to_string());
    }

    if !outcome.success() {
        let failed = outcome
            .phases()
            .into_iter()
            .find(|p| !p.success)
            .map(|p| p.phase_id);
        match failed {
            Some(id) => bail!("migration failed in phase {}", id),
            None => bail!("migration failed"),
        }
    }
    Ok(())
}

fn print_outcome(outcome: &InvocationOutcome, policy: &str) {
    for phase in outcome.phases() {
        let header = format!("Phase {}", phase.phase_id);
        if phase.success {
            println!("{} {}", header.bold(), "ok".green());
        } else {
            println!("{} {}", header.bold(), "failed".red());
        }
        if !phase.results.is_empty() {
            println!("{}", output::phase_table(phase));
        }
        if let Some(error) = &phase.error {
            output::error(error);
        }
        if phase.rolled_back {
            output::warning("Phase rolled back, no units from it remain applied");
        } else if !phase.success && phase.applied_count() > 0 {
            output::warning(&format!(
                "{} unit(s) stay applied ({} policy)",
                phase.applied_count(),
                policy
            ));
        }
        println!();
    }

    if outcome.success() {
        output::success("All attempted phases applied");
    }
}
