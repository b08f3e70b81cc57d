//! PostgreSQL executor backed by a single sqlx connection
//!
//! Units are sent with the simple query protocol (`sqlx::raw_sql`), so one
//! round trip may carry several statements, dollar-quoted bodies included.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor};
use tracing::{debug, warn};

use crate::domain::result::{Error, Result};
use crate::ports::{Connector, SqlExecutor};

const APPLICATION_NAME: &str = "phaseline";

/// One owned PostgreSQL connection
pub struct PgExecutor {
    conn: Option<PgConnection>,
}

impl PgExecutor {
    /// Connect to `database_url`
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = PgConnectOptions::from_str(database_url)
            .map_err(|e| Error::config(format!("invalid database URL: {}", e)))?
            .application_name(APPLICATION_NAME);

        let conn = PgConnection::connect_with(&options)
            .await
            .map_err(|e| Error::database(format!("failed to connect: {}", e)))?;

        debug!(host = options.get_host(), "connected to postgres");
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| Error::database("connection already closed"))
    }
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(sqlx::raw_sql(sql)).await?;
        Ok(())
    }

    fn abandon(&mut self) {
        if self.conn.take().is_some() {
            warn!("postgres connection abandoned with a request in flight");
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }
}

/// Opens a fresh [`PgExecutor`] for every invocation
#[derive(Debug, Clone)]
pub struct PgConnector {
    database_url: String,
}

impl PgConnector {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn SqlExecutor>> {
        Ok(Box::new(PgExecutor::connect(&self.database_url).await?))
    }
}
