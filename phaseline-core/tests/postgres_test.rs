//! Tests against a live PostgreSQL server
//!
//! Skipped unless PHASELINE_TEST_DATABASE_URL is set:
//! PHASELINE_TEST_DATABASE_URL=postgres://postgres@localhost/phaseline_test \
//!     cargo test --test postgres_test -- --nocapture

use std::time::{Duration, Instant};

use phaseline_core::adapters::postgres::PgExecutor;
use phaseline_core::ports::SqlExecutor;
use phaseline_core::services::PhaseRunner;
use phaseline_core::{Error, FailurePolicy, MigrationUnit, Phase, RunOptions, StatementMode};

fn database_url() -> Option<String> {
    let url = std::env::var("PHASELINE_TEST_DATABASE_URL").ok();
    if url.is_none() {
        eprintln!("PHASELINE_TEST_DATABASE_URL not set, skipping");
    }
    url
}

/// Scratch schema so runs don't collide
fn schema() -> String {
    format!("phaseline_test_{}", uuid::Uuid::new_v4().simple())
}

fn phase(schema: &str, broken: bool) -> Phase {
    let units = vec![
        MigrationUnit::new("001_schema", format!("CREATE SCHEMA {};", schema)).unwrap(),
        MigrationUnit::new(
            "002_table",
            format!(
                "CREATE TABLE {s}.items (id serial PRIMARY KEY, name text);\n\
                 CREATE FUNCTION {s}.touch() RETURNS trigger AS $$\n\
                 BEGIN NEW.name := lower(NEW.name); RETURN NEW; END;\n\
                 $$ LANGUAGE plpgsql;",
                s = schema
            ),
        )
        .unwrap(),
        MigrationUnit::new(
            "003_broken",
            if broken {
                format!("INSERT INTO {}.items (name) VALUES ('a');\nSELECT * FROM {}.missing;", schema, schema)
            } else {
                "SELECT 1;".to_string()
            },
        )
        .unwrap(),
    ];
    Phase::new(1, "scratch", units, None).unwrap()
}

async fn schema_exists(url: &str, schema: &str) -> bool {
    let mut probe = PgExecutor::connect(url).await.unwrap();
    let found = probe
        .execute(&format!(
            "DO $$ BEGIN IF NOT EXISTS (SELECT 1 FROM pg_namespace WHERE nspname = '{}') \
             THEN RAISE EXCEPTION 'absent'; END IF; END $$;",
            schema
        ))
        .await
        .is_ok();
    probe.close().await.unwrap();
    found
}

async fn relation_exists(url: &str, relation: &str) -> bool {
    let mut probe = PgExecutor::connect(url).await.unwrap();
    let found = probe
        .execute(&format!(
            "DO $$ BEGIN IF to_regclass('{}') IS NULL THEN RAISE EXCEPTION 'absent'; END IF; END $$;",
            relation
        ))
        .await
        .is_ok();
    probe.close().await.unwrap();
    found
}

/// Schema unit followed by a unit that sleeps past a one second limit
fn slow_phase(schema: &str) -> Phase {
    let units = vec![
        MigrationUnit::new("001_schema", format!("CREATE SCHEMA {};", schema)).unwrap(),
        MigrationUnit::new(
            "002_slow",
            format!("SELECT pg_sleep(4);\nCREATE TABLE {}.late (id int);", schema),
        )
        .unwrap(),
    ];
    Phase::new(1, "scratch", units, None).unwrap()
}

fn one_second(policy: FailurePolicy) -> PhaseRunner {
    PhaseRunner::new(RunOptions {
        failure_policy: policy,
        unit_timeout: Some(Duration::from_secs(1)),
        ..Default::default()
    })
}

async fn drop_schema(url: &str, schema: &str) {
    let mut conn = PgExecutor::connect(url).await.unwrap();
    conn.execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE;", schema))
        .await
        .unwrap();
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_batch_units_apply() {
    let Some(url) = database_url() else { return };
    let schema = schema();
    let mut conn = PgExecutor::connect(&url).await.unwrap();

    let result = PhaseRunner::default().run(&phase(&schema, false), &mut conn).await;
    conn.close().await.unwrap();

    assert!(result.success, "{:?}", result);
    assert!(schema_exists(&url, &schema).await);
    drop_schema(&url, &schema).await;
}

#[tokio::test]
async fn test_leave_partial_keeps_applied_units() {
    let Some(url) = database_url() else { return };
    let schema = schema();
    let mut conn = PgExecutor::connect(&url).await.unwrap();

    let runner = PhaseRunner::new(RunOptions {
        statement_mode: StatementMode::PerStatement,
        ..Default::default()
    });
    let result = runner.run(&phase(&schema, true), &mut conn).await;
    conn.close().await.unwrap();

    assert!(!result.success);
    assert_eq!(result.stopped_at.as_deref(), Some("003_broken"));
    let failure = result.failure().unwrap();
    assert_eq!(failure.statement_index, Some(1));
    assert!(failure.error.as_deref().unwrap().contains("missing"));
    assert!(schema_exists(&url, &schema).await);
    drop_schema(&url, &schema).await;
}

#[tokio::test]
async fn test_transactional_policy_rolls_back_ddl() {
    let Some(url) = database_url() else { return };
    let schema = schema();
    let mut conn = PgExecutor::connect(&url).await.unwrap();

    let runner = PhaseRunner::new(RunOptions {
        failure_policy: FailurePolicy::Transactional,
        ..Default::default()
    });
    let result = runner.run(&phase(&schema, true), &mut conn).await;
    conn.close().await.unwrap();

    assert!(!result.success);
    assert!(result.rolled_back);
    assert!(!schema_exists(&url, &schema).await);
}

#[tokio::test]
async fn test_closed_executor_rejects_sql() {
    let Some(url) = database_url() else { return };
    let mut conn = PgExecutor::connect(&url).await.unwrap();
    conn.close().await.unwrap();

    assert!(matches!(conn.execute("SELECT 1").await, Err(Error::Database(_))));
}

#[tokio::test]
async fn test_timed_out_unit_leaves_nothing_behind() {
    let Some(url) = database_url() else { return };
    let schema = schema();
    let mut conn = PgExecutor::connect(&url).await.unwrap();

    let started = Instant::now();
    let result = one_second(FailurePolicy::LeavePartial)
        .run(&slow_phase(&schema), &mut conn)
        .await;
    let elapsed = started.elapsed();
    conn.close().await.unwrap();

    assert!(!result.success);
    assert_eq!(result.stopped_at.as_deref(), Some("002_slow"));
    let error = result.failure().unwrap().error.clone().unwrap();
    assert!(error.contains("statement timeout"), "{}", error);
    assert!(elapsed < Duration::from_secs(4), "{:?}", elapsed);

    // long enough for the sleep to have finished had it kept running
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(!relation_exists(&url, &format!("{}.late", schema)).await);
    assert!(schema_exists(&url, &schema).await);
    drop_schema(&url, &schema).await;
}

#[tokio::test]
async fn test_timed_out_transaction_rolls_back_promptly() {
    let Some(url) = database_url() else { return };
    let schema = schema();
    let mut conn = PgExecutor::connect(&url).await.unwrap();

    let started = Instant::now();
    let result = one_second(FailurePolicy::Transactional)
        .run(&slow_phase(&schema), &mut conn)
        .await;
    let elapsed = started.elapsed();
    conn.close().await.unwrap();

    assert!(!result.success);
    assert!(result.rolled_back);
    assert!(elapsed < Duration::from_secs(4), "{:?}", elapsed);
    assert!(!schema_exists(&url, &schema).await);
}
