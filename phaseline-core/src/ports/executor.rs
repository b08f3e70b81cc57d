//! SQL execution port - the database connection seen by the runner

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::result::Result;

/// A live database connection owned by one invocation.
///
/// `execute` submits SQL text that may hold several statements. Failures
/// the database reports for the submitted SQL come back as
/// [`Error::UnitExecution`](crate::Error::UnitExecution).
#[async_trait]
pub trait SqlExecutor: Send {
    /// Execute SQL text as one logical operation
    async fn execute(&mut self, sql: &str) -> Result<()>;

    async fn begin(&mut self) -> Result<()> {
        self.execute("BEGIN").await
    }

    async fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK").await
    }

    /// Bound every statement on the server. PostgreSQL applies the limit to
    /// each statement of a multi-statement message separately and cancels
    /// the overrunning one, so its effects never commit.
    async fn set_statement_timeout(&mut self, limit: Duration) -> Result<()> {
        self.execute(&format!("SET statement_timeout = {}", limit.as_millis()))
            .await
    }

    /// Drop the connection without waiting for the server. Called when a
    /// unit overran its timeout and a request may still be in flight.
    fn abandon(&mut self) {}

    /// Release the connection. Further calls are errors.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens a fresh connection per invocation
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn SqlExecutor>>;
}
