//! Core domain entities
//!
//! Migration units, phases and the results of running them. These are pure
//! data structures with validation logic - no I/O.

mod outcome;
mod phase;
pub mod result;
pub mod unit;

pub use outcome::{ChainResult, ExecutionResult, PhaseResult};
pub use phase::Phase;
pub use unit::MigrationUnit;
