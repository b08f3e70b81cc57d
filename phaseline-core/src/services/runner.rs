//! Phase runner - applies one phase's units against a live connection
//!
//! Units run strictly in ascending sequence. The first failing unit stops
//! the phase; there is no "continue past a broken migration" mode and no
//! automatic retry, because later units may rely on objects the failed one
//! was meant to create.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{FailurePolicy, RunOptions, StatementMode};
use crate::domain::result::{Error, Result};
use crate::domain::{ExecutionResult, MigrationUnit, Phase, PhaseResult};
use crate::ports::SqlExecutor;
use crate::services::statements::split_statements;

/// How long the client waits past the unit timeout before it stops
/// waiting on the server
const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Runs a single phase
#[derive(Debug, Clone, Default)]
pub struct PhaseRunner {
    options: RunOptions,
}

impl PhaseRunner {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run every unit of `phase` in order.
    ///
    /// The executor is borrowed for the duration of the phase; closing it is
    /// the owner's job. Under [`FailurePolicy::LeavePartial`] units applied
    /// before a failure are not undone.
    pub async fn run(&self, phase: &Phase, executor: &mut dyn SqlExecutor) -> PhaseResult {
        let mut result = PhaseResult::new(phase.id);
        let transactional = self.options.failure_policy == FailurePolicy::Transactional;

        info!(
            phase = phase.id,
            name = %phase.name,
            units = phase.units.len(),
            policy = %self.options.failure_policy,
            "phase started"
        );

        if let Some(limit) = self.options.unit_timeout {
            if let Err(e) = executor.set_statement_timeout(limit).await {
                warn!(phase = phase.id, error = %e, "could not set statement timeout");
                result.success = false;
                result.error = Some(format!("failed to set statement timeout: {}", e));
                return result;
            }
        }

        if transactional {
            if let Err(e) = executor.begin().await {
                warn!(phase = phase.id, error = %e, "could not open phase transaction");
                result.success = false;
                result.error = Some(format!("failed to begin transaction: {}", e));
                return result;
            }
        }

        let mut abandoned = false;
        for unit in &phase.units {
            let applied = match self.apply_unit(unit, executor).await {
                Some(applied) => applied,
                None => {
                    abandoned = true;
                    Err(Error::unit(format!(
                        "unit did not finish within {:?} of its timeout, connection abandoned and server-side outcome unknown",
                        TIMEOUT_GRACE
                    )))
                }
            };
            match applied {
                Ok(()) => {
                    debug!(phase = phase.id, unit = %unit.name, "unit applied");
                    result.results.push(ExecutionResult::applied(&unit.name));
                }
                Err(e) => {
                    warn!(phase = phase.id, unit = %unit.name, error = %e, "unit failed");
                    result.results.push(ExecutionResult::failed(
                        &unit.name,
                        e.to_string(),
                        e.statement_index(),
                    ));
                    result.success = false;
                    result.stopped_at = Some(unit.name.clone());
                    break;
                }
            }
        }

        if transactional && abandoned {
            result.error = Some(
                "transaction left on an abandoned connection, the server aborts it when the session ends"
                    .to_string(),
            );
        } else if transactional {
            if result.success {
                if let Err(e) = executor.commit().await {
                    warn!(phase = phase.id, error = %e, "phase commit failed");
                    result.success = false;
                    result.error = Some(format!("failed to commit phase: {}", e));
                }
            } else {
                match executor.rollback().await {
                    Ok(()) => result.rolled_back = true,
                    Err(e) => {
                        warn!(phase = phase.id, error = %e, "phase rollback failed");
                        result.error = Some(format!("rollback failed: {}", e));
                    }
                }
            }
        }

        info!(
            phase = phase.id,
            success = result.success,
            applied = result.applied_count(),
            "phase finished"
        );
        result
    }

    /// Apply one unit.
    ///
    /// The server enforces the unit timeout through `statement_timeout`. The
    /// client only steps in when the server stays silent for a grace period
    /// past it; then the connection is abandoned and `None` is returned.
    async fn apply_unit(
        &self,
        unit: &MigrationUnit,
        executor: &mut dyn SqlExecutor,
    ) -> Option<Result<()>> {
        let Some(limit) = self.options.unit_timeout else {
            return Some(self.execute_unit(unit, executor).await);
        };
        let bounded =
            tokio::time::timeout(limit + TIMEOUT_GRACE, self.execute_unit(unit, executor)).await;
        match bounded {
            Ok(applied) => Some(applied),
            Err(_) => {
                warn!(unit = %unit.name, ?limit, "server did not enforce the unit timeout");
                executor.abandon();
                None
            }
        }
    }

    async fn execute_unit(&self, unit: &MigrationUnit, executor: &mut dyn SqlExecutor) -> Result<()> {
        if self.options.statement_mode == StatementMode::Batch {
            return executor.execute(&unit.sql).await;
        }

        let statements = match split_statements(&unit.sql) {
            Ok(statements) => statements,
            Err(e) => {
                warn!(unit = %unit.name, error = %e, "cannot split unit, submitting it whole");
                return executor.execute(&unit.sql).await;
            }
        };

        for (index, statement) in statements.iter().enumerate() {
            executor.execute(statement).await.map_err(|e| match e {
                Error::UnitExecution { message, .. } => Error::UnitExecution {
                    message,
                    statement_index: Some(index),
                },
                other => Error::UnitExecution {
                    message: other.to_string(),
                    statement_index: Some(index),
                },
            })?;
        }
        Ok(())
    }
}
