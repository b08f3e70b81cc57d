//! Phaseline CLI - phased PostgreSQL migrations in your terminal

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{check, embed, list, logs, run, serve};

/// Phaseline - apply the migration corpus phase by phase
#[derive(Parser)]
#[command(name = "phaseline", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply migrations (the whole chain unless --phase is given)
    Run {
        /// Start at this phase
        #[arg(long)]
        phase: Option<u32>,
        /// Run only --phase, without chaining into later phases
        #[arg(long, requires = "phase")]
        single: bool,
        /// Assert that earlier phases already succeeded in a prior run
        #[arg(long)]
        predecessors_applied: bool,
        /// Failure policy: leave-partial or transactional
        #[arg(long)]
        policy: Option<String>,
        /// Submit units statement by statement
        #[arg(long)]
        per_statement: bool,
        /// Per-unit timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the embedded migration units
    List {
        /// Only this phase
        #[arg(long)]
        phase: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check store integrity and parse every unit
    Check {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Embed SQL files into a runner artifact
    Embed {
        /// Artifact to splice the units into
        #[arg(long)]
        target: PathBuf,
        /// Comma-separated unit names, in registration order
        #[arg(long, value_delimiter = ',', required = true)]
        names: Vec<String>,
        /// Directory holding <name>.sql (defaults to PHASELINE_SQL_DIR)
        #[arg(long)]
        source_dir: Option<PathBuf>,
        /// Literal syntax of the target: rust or template
        #[arg(long, default_value = "rust")]
        syntax: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve POST /migrate over HTTP
    Serve {
        /// Address to bind (overrides settings)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides settings)
        #[arg(long)]
        port: Option<u16>,
    },

    /// View and manage the run journal
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = dispatch(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            phase,
            single,
            predecessors_applied,
            policy,
            per_statement,
            timeout,
            json,
        } => run::run(
            phase,
            single,
            predecessors_applied,
            policy.as_deref(),
            per_statement,
            timeout,
            json,
        ),
        Commands::List { phase, json } => list::run(phase, json),
        Commands::Check { json } => check::run(json),
        Commands::Embed {
            target,
            names,
            source_dir,
            syntax,
            json,
        } => embed::run(target, names, source_dir, &syntax, json),
        Commands::Serve { host, port } => serve::run(host, port),
        Commands::Logs { command } => logs::run(command),
    }
}
