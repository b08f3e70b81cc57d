//! Phase entity - a dependency-ordered batch of migration units

use std::collections::HashSet;

use serde::Serialize;

use super::result::{Error, Result};
use super::unit::MigrationUnit;

/// One deployment stage of the migration corpus
#[derive(Debug, Clone, Serialize)]
pub struct Phase {
    pub id: u32,
    pub name: String,
    pub units: Vec<MigrationUnit>,
    /// Phase that must have succeeded before this one may run
    pub predecessor: Option<u32>,
}

impl Phase {
    /// Create a phase with its units sorted by ascending sequence.
    ///
    /// Duplicate sequences or names inside one phase are rejected.
    pub fn new(
        id: u32,
        name: impl Into<String>,
        mut units: Vec<MigrationUnit>,
        predecessor: Option<u32>,
    ) -> Result<Self> {
        units.sort_by_key(|u| u.sequence);

        {
            let mut names = HashSet::new();
            for unit in &units {
                if !names.insert(unit.name.as_str()) {
                    return Err(Error::DuplicateUnit(unit.name.clone()));
                }
            }
        }
        for pair in units.windows(2) {
            if pair[0].sequence == pair[1].sequence {
                return Err(Error::validation(format!(
                    "units '{}' and '{}' share sequence {}",
                    pair[0].name, pair[1].name, pair[0].sequence
                )));
            }
        }

        Ok(Self {
            id,
            name: name.into(),
            units,
            predecessor,
        })
    }

    /// Names of the units in execution order
    pub fn unit_names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str) -> MigrationUnit {
        MigrationUnit::new(name, "SELECT 1;").unwrap()
    }

    #[test]
    fn test_units_are_sorted_by_sequence() {
        let phase = Phase::new(
            1,
            "core",
            vec![unit("003_c"), unit("001_a"), unit("002_b")],
            None,
        )
        .unwrap();

        assert_eq!(phase.unit_names(), vec!["001_a", "002_b", "003_c"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let result = Phase::new(1, "core", vec![unit("001_a"), unit("001_a")], None);
        assert!(matches!(result, Err(Error::DuplicateUnit(name)) if name == "001_a"));
    }

    #[test]
    fn test_duplicate_sequence_rejected() {
        let result = Phase::new(1, "core", vec![unit("001_a"), unit("001_b")], None);
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
