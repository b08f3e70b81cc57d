//! Migration unit store - embedded SQL files
//!
//! Migrations are compiled into the binary at build time using include_str!.
//! Each phase is a plain table of (name, sql_content) pairs; the sequence of
//! a unit is the numeric prefix of its name.
//!
//! IMPORTANT: When adding a new migration:
//! 1. Create the SQL file in the phase directory: NNN_description.sql
//! 2. Use the next free number across ALL phases (names are global)
//! 3. Add an entry to the phase table here, in order

use crate::domain::result::{Error, Result};
use crate::domain::{MigrationUnit, Phase};

/// Phase 1: core application schema
pub const CORE: &[(&str, &str)] = &[
    ("001_extensions", include_str!("core/001_extensions.sql")),
    ("002_organizations", include_str!("core/002_organizations.sql")),
    ("003_profiles", include_str!("core/003_profiles.sql")),
    ("004_audit_log", include_str!("core/004_audit_log.sql")),
    (
        "005_updated_at_triggers",
        include_str!("core/005_updated_at_triggers.sql"),
    ),
];

/// Phase 2: ERP integrations (Conta Azul, Tiny, webhooks)
pub const INTEGRATIONS: &[(&str, &str)] = &[
    (
        "006_integration_credentials",
        include_str!("integrations/006_integration_credentials.sql"),
    ),
    ("007_oauth_states", include_str!("integrations/007_oauth_states.sql")),
    ("008_sync_jobs", include_str!("integrations/008_sync_jobs.sql")),
    (
        "009_contaazul_staging",
        include_str!("integrations/009_contaazul_staging.sql"),
    ),
    ("010_tiny_staging", include_str!("integrations/010_tiny_staging.sql")),
    (
        "011_webhook_events",
        include_str!("integrations/011_webhook_events.sql"),
    ),
];

/// Phase 3: data warehouse
pub const WAREHOUSE: &[(&str, &str)] = &[
    ("012_dw_schema", include_str!("warehouse/012_dw_schema.sql")),
    ("013_dim_date", include_str!("warehouse/013_dim_date.sql")),
    ("014_dimensions", include_str!("warehouse/014_dimensions.sql")),
    ("015_facts", include_str!("warehouse/015_facts.sql")),
    (
        "016_reporting_views",
        include_str!("warehouse/016_reporting_views.sql"),
    ),
];

/// Phase table: (id, name, units). Chain order is table order; each phase's
/// predecessor is the row before it.
const PHASES: &[(u32, &str, &[(&str, &str)])] = &[
    (1, "core", CORE),
    (2, "integrations", INTEGRATIONS),
    (3, "warehouse", WAREHOUSE),
];

/// All phases in chain order
pub fn phases() -> Result<Vec<Phase>> {
    let mut phases = Vec::with_capacity(PHASES.len());
    let mut predecessor = None;

    for (id, name, table) in PHASES {
        let units = table
            .iter()
            .map(|(unit_name, sql)| MigrationUnit::new(*unit_name, *sql))
            .collect::<Result<Vec<_>>>()?;
        phases.push(Phase::new(*id, *name, units, predecessor)?);
        predecessor = Some(*id);
    }

    Ok(phases)
}

/// Look up one phase by id
pub fn phase(id: u32) -> Result<Phase> {
    phases()?
        .into_iter()
        .find(|p| p.id == id)
        .ok_or_else(|| Error::validation(format!("unknown phase {}", id)))
}

/// Look up one phase by name (e.g. "warehouse")
pub fn phase_by_name(name: &str) -> Result<Phase> {
    phases()?
        .into_iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| Error::validation(format!("unknown phase '{}'", name)))
}

/// Units of one phase in ascending sequence order
pub fn list_units(phase_id: u32) -> Result<Vec<MigrationUnit>> {
    Ok(phase(phase_id)?.units)
}
