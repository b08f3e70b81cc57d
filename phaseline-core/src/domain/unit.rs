//! Migration unit entity

use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// One named, ordered block of schema-changing SQL.
///
/// Names follow `NNN_description`; the numeric prefix is the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationUnit {
    pub name: String,
    pub sequence: u32,
    #[serde(skip_serializing)]
    pub sql: String,
}

impl MigrationUnit {
    /// Create a unit, parsing the sequence from the name prefix
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let sequence = parse_sequence(&name)?;
        Ok(Self {
            name,
            sequence,
            sql: sql.into(),
        })
    }
}

/// Parse the numeric prefix of a `NNN_description` name.
pub fn parse_sequence(name: &str) -> Result<u32> {
    let (prefix, description) = name
        .split_once('_')
        .ok_or_else(|| Error::validation(format!("'{}' does not match NNN_description", name)))?;

    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::validation(format!(
            "'{}' must start with a numeric sequence",
            name
        )));
    }

    if description.is_empty()
        || !description
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::validation(format!(
            "'{}' has an invalid description part",
            name
        )));
    }

    prefix
        .parse::<u32>()
        .map_err(|e| Error::validation(format!("'{}': {}", name, e)))
}
