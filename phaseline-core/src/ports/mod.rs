//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The runner and the
//! coordinator depend only on these traits, not on a concrete database driver.

mod executor;

pub use executor::{Connector, SqlExecutor};
