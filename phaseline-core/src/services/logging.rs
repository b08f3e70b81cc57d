//! Logging service - structured run journal in DuckDB
//!
//! Every migration run, embed and server invocation leaves structured events
//! in `logs.duckdb` inside the phaseline directory. SQL text and credentials
//! are never written to the journal; failures carry the database's error
//! message only.
//!
//! Journal writes must never break a run: callers ignore their errors.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use duckdb::Connection;
use serde::{Deserialize, Serialize};

use crate::log_migrations::LOG_MIGRATIONS;
use crate::services::chain::InvocationOutcome;
use crate::services::embed::EmbedReport;

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Get current unix timestamp in milliseconds
fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a unique ID based on timestamp + counter
fn generate_id() -> u64 {
    // Lower 16 bits: counter (65536 unique IDs per millisecond)
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    ((now_ms() as u64) << 16) | counter
}

/// Fresh identifier grouping the events of one invocation
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Process that wrote a journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPoint {
    Cli,
    Server,
}

impl EntryPoint {
    fn as_str(&self) -> &'static str {
        match self {
            EntryPoint::Cli => "cli",
            EntryPoint::Server => "server",
        }
    }
}

/// A journal event to be recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl LogEvent {
    /// Create a new log event with just an event name
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            run_id: None,
            phase: None,
            unit: None,
            command: None,
            error_message: None,
            error_details: None,
        }
    }

    /// Group the event under one invocation
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_phase(mut self, phase: u32) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the command context (for CLI events)
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Set error information
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Set error details (statement index, rollback state, ...)
    pub fn with_error_details(mut self, details: impl Into<String>) -> Self {
        self.error_details = Some(details.into());
        self
    }
}

/// A journal entry as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: i64,
    pub entry_point: String,
    pub app_version: String,
    pub run_id: Option<String>,
    pub event: String,
    pub phase: Option<u32>,
    pub unit: Option<String>,
    pub command: Option<String>,
    pub error_message: Option<String>,
    pub error_details: Option<String>,
}

const SELECT_COLUMNS: &str = "SELECT id, timestamp, entry_point, app_version, run_id, \
     event, phase, unit, command, error_message, error_details FROM sys_logs";

fn map_entry(row: &duckdb::Row<'_>) -> duckdb::Result<LogEntry> {
    Ok(LogEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        entry_point: row.get(2)?,
        app_version: row.get(3)?,
        run_id: row.get(4)?,
        event: row.get(5)?,
        phase: row.get::<_, Option<i32>>(6)?.map(|p| p as u32),
        unit: row.get(7)?,
        command: row.get(8)?,
        error_message: row.get(9)?,
        error_details: row.get(10)?,
    })
}

/// Service for the structured run journal
///
/// This service manages the logs.duckdb database and provides methods
/// for recording events and querying the journal.
pub struct LoggingService {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    entry_point: EntryPoint,
    app_version: String,
}

impl LoggingService {
    /// Create a new logging service
    ///
    /// Opens or creates logs.duckdb in the phaseline directory and runs
    /// any pending journal migrations.
    pub fn new(
        phaseline_dir: &Path,
        entry_point: EntryPoint,
        app_version: impl Into<String>,
    ) -> Result<Self> {
        let db_path = phaseline_dir.join("logs.duckdb");
        let conn = Connection::open(&db_path)?;

        let service = Self {
            conn: Mutex::new(conn),
            db_path,
            entry_point,
            app_version: app_version.into(),
        };

        service.run_migrations()?;

        Ok(service)
    }

    /// Run any pending journal migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;

        let table_exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM information_schema.tables WHERE table_name = 'sys_migrations'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);

        // Bootstrap migrations table if needed
        if !table_exists {
            if let Some((name, sql)) = LOG_MIGRATIONS.iter().find(|(n, _)| *n == "000_migrations.sql")
            {
                conn.execute_batch(sql)?;
                conn.execute(
                    "INSERT INTO sys_migrations (migration_name) VALUES (?)",
                    [name],
                )?;
            }
        }

        let mut stmt = conn.prepare("SELECT migration_name FROM sys_migrations")?;
        let applied: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();

        for (name, sql) in LOG_MIGRATIONS.iter() {
            if *name == "000_migrations.sql" || applied.iter().any(|a| a == name) {
                continue;
            }
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO sys_migrations (migration_name) VALUES (?)",
                [name],
            )?;
        }

        Ok(())
    }

    /// Record an event
    ///
    /// The entry point and app version are added from the service
    /// configuration.
    pub fn log(&self, event: LogEvent) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;

        conn.execute(
            r#"
            INSERT INTO sys_logs (
                id, timestamp, entry_point, app_version, run_id,
                event, phase, unit, command, error_message, error_details
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            duckdb::params![
                generate_id(),
                now_ms(),
                self.entry_point.as_str(),
                &self.app_version,
                &event.run_id,
                &event.event,
                event.phase.map(|p| p as i32),
                &event.unit,
                &event.command,
                &event.error_message,
                &event.error_details,
            ],
        )?;

        Ok(())
    }

    /// Record a simple event with just a name
    pub fn log_event(&self, event: &str) -> Result<()> {
        self.log(LogEvent::new(event))
    }

    /// Record a CLI command execution
    pub fn log_command(&self, command: &str) -> Result<()> {
        self.log(LogEvent::new("command_executed").with_command(command))
    }

    /// Record an error
    pub fn log_error(&self, event: &str, message: &str, details: Option<&str>) -> Result<()> {
        let mut log_event = LogEvent::new(event).with_error(message);
        if let Some(d) = details {
            log_event = log_event.with_error_details(d);
        }
        self.log(log_event)
    }

    /// Record the outcome of a migration invocation: one event per
    /// attempted phase plus one for the failing unit, if any.
    pub fn record_outcome(&self, run_id: &str, outcome: &InvocationOutcome) -> Result<()> {
        for phase in outcome.phases() {
            let event = if phase.success {
                "phase_completed"
            } else {
                "phase_failed"
            };
            let mut log_event = LogEvent::new(event)
                .with_run_id(run_id)
                .with_phase(phase.phase_id);
            if let Some(error) = &phase.error {
                log_event = log_event.with_error(error.as_str());
            }
            self.log(log_event)?;

            if let Some(failure) = phase.failure() {
                let mut details = Vec::new();
                if let Some(index) = failure.statement_index {
                    details.push(format!("statement_index={}", index));
                }
                if phase.rolled_back {
                    details.push("rolled_back".to_string());
                }

                let mut log_event = LogEvent::new("unit_failed")
                    .with_run_id(run_id)
                    .with_phase(phase.phase_id)
                    .with_unit(failure.unit_name.as_str())
                    .with_error(failure.error.clone().unwrap_or_default());
                if !details.is_empty() {
                    log_event = log_event.with_error_details(details.join(", "));
                }
                self.log(log_event)?;
            }
        }

        let event = if outcome.success() {
            "run_completed"
        } else {
            "run_failed"
        };
        self.log(LogEvent::new(event).with_run_id(run_id))
    }

    /// Record the result of an embed run
    pub fn record_embed(&self, report: &EmbedReport) -> Result<()> {
        for name in &report.skipped {
            self.log(
                LogEvent::new("unit_skipped")
                    .with_command("embed")
                    .with_unit(name.as_str())
                    .with_error_details("source file not found"),
            )?;
        }
        self.log(
            LogEvent::new("embed_completed")
                .with_command("embed")
                .with_error_details(format!("embedded={}", report.embedded.join(","))),
        )
    }

    /// Query recent journal entries, newest first
    pub fn get_recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;

        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY timestamp DESC, id DESC LIMIT ?",
            SELECT_COLUMNS
        ))?;
        let entries = stmt
            .query_map([limit as i64], map_entry)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(entries)
    }

    /// Query journal entries with errors
    pub fn get_errors(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE error_message IS NOT NULL ORDER BY timestamp DESC, id DESC LIMIT ?",
            SELECT_COLUMNS
        ))?;
        let entries = stmt
            .query_map([limit as i64], map_entry)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(entries)
    }

    /// All entries of one run, in the order they were written
    pub fn get_run(&self, run_id: &str) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE run_id = ? ORDER BY id ASC",
            SELECT_COLUMNS
        ))?;
        let entries = stmt
            .query_map([run_id], map_entry)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(entries)
    }

    /// Get the total number of journal entries
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM sys_logs", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete entries older than the specified timestamp (unix ms)
    pub fn delete_before(&self, timestamp_ms: i64) -> Result<u64> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let deleted = conn.execute("DELETE FROM sys_logs WHERE timestamp < ?", [timestamp_ms])?;
        Ok(deleted as u64)
    }

    /// Get the path to the journal database
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChainResult, ExecutionResult, PhaseResult};
    use tempfile::tempdir;

    #[test]
    fn test_logging_service_creation() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();

        assert!(service.db_path().exists());
    }

    #[test]
    fn test_reopen_does_not_rerun_migrations() {
        let dir = tempdir().unwrap();
        {
            let service = LoggingService::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();
            service.log_event("first").unwrap();
        }
        let service = LoggingService::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();
        assert_eq!(service.count().unwrap(), 1);
    }

    #[test]
    fn test_log_event() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), EntryPoint::Server, "1.0.0").unwrap();

        service
            .log(
                LogEvent::new("phase_completed")
                    .with_run_id("run-1")
                    .with_phase(2),
            )
            .unwrap();

        let entries = service.get_recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, "phase_completed");
        assert_eq!(entries[0].entry_point, "server");
        assert_eq!(entries[0].phase, Some(2));
        assert_eq!(entries[0].run_id.as_deref(), Some("run-1"));
    }

    #[test]
    fn test_record_outcome() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();

        let mut core = PhaseResult::new(1);
        core.results.push(ExecutionResult::applied("001_extensions"));
        let mut integrations = PhaseResult::new(2);
        integrations.results.push(ExecutionResult::failed(
            "006_integration_credentials",
            "relation \"app.organizations\" does not exist",
            Some(0),
        ));
        integrations.success = false;
        integrations.stopped_at = Some("006_integration_credentials".to_string());

        let outcome = InvocationOutcome::Chain(ChainResult {
            success: false,
            phases: vec![core, integrations],
        });
        service.record_outcome("run-42", &outcome).unwrap();

        let events: Vec<_> = service
            .get_run("run-42")
            .unwrap()
            .into_iter()
            .map(|e| e.event)
            .collect();
        assert_eq!(
            events,
            vec!["phase_completed", "phase_failed", "unit_failed", "run_failed"]
        );

        let errors = service.get_errors(10).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].unit.as_deref(), Some("006_integration_credentials"));
        assert_eq!(errors[0].error_details.as_deref(), Some("statement_index=0"));
    }

    #[test]
    fn test_skipped_units_are_not_errors() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();

        let report = EmbedReport {
            embedded: vec!["001_init".to_string()],
            skipped: vec!["002_missing".to_string()],
        };
        service.record_embed(&report).unwrap();

        assert!(service.get_errors(10).unwrap().is_empty());
        let entries = service.get_recent(10).unwrap();
        let skipped = entries.iter().find(|e| e.event == "unit_skipped").unwrap();
        assert_eq!(skipped.unit.as_deref(), Some("002_missing"));
        assert_eq!(skipped.error_message, None);
        assert_eq!(skipped.error_details.as_deref(), Some("source file not found"));
    }

    #[test]
    fn test_count_and_delete() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), EntryPoint::Cli, "1.0.0").unwrap();

        service.log_event("event1").unwrap();
        service.log_command("run").unwrap();
        service.log_error("run_failed", "boom", None).unwrap();

        assert_eq!(service.count().unwrap(), 3);

        let deleted = service.delete_before(now_ms() + 1000).unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(service.count().unwrap(), 0);
    }
}
