//! End-to-end tests over the public API with the embedded store
//!
//! Run with: cargo test --test integration_tests

use std::path::PathBuf;

use async_trait::async_trait;
use tempfile::TempDir;

use phaseline_core::migrations;
use phaseline_core::ports::SqlExecutor;
use phaseline_core::services::{embed, split_statements, ChainCoordinator, PhaseRunner};
use phaseline_core::{
    EmbedRequest, EmbedSyntax, EntryPoint, Error, FailurePolicy, Invocation, InvocationOutcome,
    LoggingService, Result, RunOptions, StatementMode,
};

/// Records every submitted SQL text; fails whatever contains `fail_on`
#[derive(Default)]
struct SpyExecutor {
    calls: Vec<String>,
    fail_on: Option<&'static str>,
}

#[async_trait]
impl SqlExecutor for SpyExecutor {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.calls.push(sql.to_string());
        match self.fail_on {
            Some(marker) if sql.contains(marker) => {
                Err(Error::unit("relation \"app.organizations\" does not exist"))
            }
            _ => Ok(()),
        }
    }
}

fn migrations_dir(phase: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("src/migrations")
        .join(phase)
}

#[tokio::test]
async fn test_full_store_chain_with_spy() {
    let phases = migrations::phases().unwrap();
    let total: usize = phases.iter().map(|p| p.units.len()).sum();
    let mut spy = SpyExecutor::default();

    let outcome = ChainCoordinator::default()
        .invoke(&phases, &Invocation::default(), &mut spy)
        .await
        .unwrap();

    assert!(outcome.success());
    assert_eq!(outcome.phases().len(), 3);
    assert_eq!(spy.calls.len(), total);
}

#[tokio::test]
async fn test_integrations_failure_never_reaches_warehouse() {
    let phases = migrations::phases().unwrap();
    let failing = migrations::INTEGRATIONS[1].1;
    let marker: &'static str = failing.lines().find(|l| l.contains("CREATE TABLE")).unwrap();
    let mut spy = SpyExecutor {
        fail_on: Some(marker),
        ..Default::default()
    };

    let outcome = ChainCoordinator::default()
        .invoke(&phases, &Invocation::default(), &mut spy)
        .await
        .unwrap();

    let InvocationOutcome::Chain(chain) = outcome else {
        panic!("expected a chain result");
    };
    assert!(!chain.success);
    assert_eq!(chain.phases.len(), 2);
    let failed = chain.failed_phase().unwrap();
    assert_eq!(failed.phase_id, 2);
    assert_eq!(failed.stopped_at.as_deref(), Some(migrations::INTEGRATIONS[1].0));
    assert_eq!(failed.results.len(), 2);

    let warehouse_sql = migrations::WAREHOUSE[0].1;
    assert!(!spy.calls.iter().any(|c| c == warehouse_sql));
}

#[tokio::test]
async fn test_per_statement_transactional_run_of_core() {
    let core = migrations::phase(1).unwrap();
    let statements: usize = core
        .units
        .iter()
        .map(|u| split_statements(&u.sql).unwrap().len())
        .sum();
    let runner = PhaseRunner::new(RunOptions {
        failure_policy: FailurePolicy::Transactional,
        statement_mode: StatementMode::PerStatement,
        unit_timeout: None,
    });
    let mut spy = SpyExecutor::default();

    let result = runner.run(&core, &mut spy).await;

    assert!(result.success);
    // BEGIN + every statement + COMMIT
    assert_eq!(spy.calls.len(), statements + 2);
    assert_eq!(spy.calls[0], "BEGIN");
    assert_eq!(spy.calls.last().unwrap(), "COMMIT");
}

#[tokio::test]
async fn test_outcome_lands_in_journal() {
    let dir = TempDir::new().unwrap();
    let journal = LoggingService::new(dir.path(), EntryPoint::Cli, "test").unwrap();
    let phases = migrations::phases().unwrap();
    let mut spy = SpyExecutor::default();

    let invocation = Invocation {
        phase: Some(3),
        single: true,
        predecessors_applied: true,
    };
    let outcome = ChainCoordinator::default()
        .invoke(&phases, &invocation, &mut spy)
        .await
        .unwrap();
    journal.record_outcome("run-1", &outcome).unwrap();

    let events: Vec<_> = journal
        .get_run("run-1")
        .unwrap()
        .into_iter()
        .map(|e| (e.event, e.phase))
        .collect();
    assert_eq!(
        events,
        vec![
            ("phase_completed".to_string(), Some(3)),
            ("run_completed".to_string(), None)
        ]
    );
}

#[test]
fn test_embed_store_units_round_trip() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("units.rs");
    std::fs::write(
        &target,
        "use std::collections::HashMap;\n\npub const UNITS: &[(&str, &str)] = &[\n];\n",
    )
    .unwrap();

    let names: Vec<String> = migrations::CORE.iter().map(|(n, _)| n.to_string()).collect();
    let report = embed(&EmbedRequest {
        names: names.clone(),
        source_dir: Some(migrations_dir("core")),
        target: target.clone(),
        syntax: EmbedSyntax::Rust,
    })
    .unwrap();
    assert_eq!(report.embedded, names);
    assert!(report.skipped.is_empty());

    let text = std::fs::read_to_string(&target).unwrap();
    for (name, sql) in migrations::CORE {
        let constant = format!("const M{}: &str = \"", name.to_uppercase());
        let start = text.find(&constant).unwrap() + constant.len();
        let escaped = &text[start..];
        let end = escaped.find("\";\n").unwrap();
        assert_eq!(EmbedSyntax::Rust.unescape(&escaped[..end]), *sql, "{}", name);
        assert!(text.contains(&format!("    (\"{}\", M{}),", name, name.to_uppercase())));
    }

    // the integrations phase continues the same artifact
    let next = embed(&EmbedRequest {
        names: vec!["006_integration_credentials".to_string()],
        source_dir: Some(migrations_dir("integrations")),
        target: target.clone(),
        syntax: EmbedSyntax::Rust,
    })
    .unwrap();
    assert_eq!(next.embedded.len(), 1);

    let again = embed(&EmbedRequest {
        names: vec!["006_integration_credentials".to_string()],
        source_dir: Some(migrations_dir("integrations")),
        target,
        syntax: EmbedSyntax::Rust,
    });
    assert!(matches!(again, Err(Error::DuplicateUnit(_))));
}
