//! Phaseline Core - phased PostgreSQL migrations with embedded SQL
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Migration units, phases and run results
//! - **ports**: Trait definitions for the database connection (SqlExecutor, Connector)
//! - **services**: Phase runner, chain coordinator, embed generator, run journal
//! - **adapters**: Concrete implementations (PostgreSQL via sqlx, HTTP via axum)
//! - **migrations**: The embedded migration store

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

// Re-export commonly used types at crate root
pub use config::{Config, FailurePolicy, RunOptions, StatementMode};
pub use domain::result::{Error, OperationResult, Result};
pub use domain::{ChainResult, ExecutionResult, MigrationUnit, Phase, PhaseResult};
pub use services::{
    EmbedReport, EmbedRequest, EmbedSyntax, EntryPoint, Invocation, InvocationOutcome, LogEntry,
    LogEvent, LoggingService, MigrationService,
};
