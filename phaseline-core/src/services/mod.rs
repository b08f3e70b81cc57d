//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

pub mod chain;
pub mod embed;
pub mod logging;
mod migration;
pub mod runner;
pub mod statements;

pub use chain::{select_phases, ChainCoordinator, Invocation, InvocationOutcome};
pub use embed::{embed, EmbedReport, EmbedRequest, EmbedSyntax};
pub use logging::{new_run_id, EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::MigrationService;
pub use runner::PhaseRunner;
pub use statements::{split_statements, validate_syntax};
