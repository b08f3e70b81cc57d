//! Migration service - one invocation, one connection
//!
//! Validates what was asked for, opens a connection, hands it to the chain
//! coordinator and closes it again on every exit path.

use std::sync::Arc;

use tracing::{info, warn};

use crate::adapters::postgres::PgConnector;
use crate::config::{Config, RunOptions};
use crate::domain::result::Result;
use crate::domain::Phase;
use crate::migrations;
use crate::ports::Connector;
use crate::services::chain::{select_phases, ChainCoordinator, Invocation, InvocationOutcome};
use crate::services::runner::PhaseRunner;

/// Runs invocations against a fresh connection each
pub struct MigrationService {
    connector: Arc<dyn Connector>,
    coordinator: ChainCoordinator,
    phases: Vec<Phase>,
}

impl MigrationService {
    pub fn new(connector: Arc<dyn Connector>, options: RunOptions, phases: Vec<Phase>) -> Self {
        Self {
            connector,
            coordinator: ChainCoordinator::new(PhaseRunner::new(options)),
            phases,
        }
    }

    /// PostgreSQL connector and the embedded store, configured from `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let connector = PgConnector::new(config.database_url()?);
        Ok(Self::new(
            Arc::new(connector),
            config.run_options,
            migrations::phases()?,
        ))
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Run one invocation.
    ///
    /// Selection and the predecessor rule are checked before connecting, so
    /// a rejected invocation never touches the database.
    pub async fn run(&self, invocation: &Invocation) -> Result<InvocationOutcome> {
        let selected = select_phases(&self.phases, invocation)?;
        ChainCoordinator::validate_order(selected, invocation.predecessors_applied)?;

        let mut executor = self.connector.connect().await?;
        let outcome = self
            .coordinator
            .invoke(&self.phases, invocation, executor.as_mut())
            .await;

        if let Err(e) = executor.close().await {
            warn!(error = %e, "failed to close connection");
        }

        if let Ok(outcome) = &outcome {
            info!(
                success = outcome.success(),
                phases = outcome.phases().len(),
                "invocation finished"
            );
        }
        outcome
    }
}
