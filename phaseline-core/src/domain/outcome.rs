//! Per-invocation execution results
//!
//! Created fresh for every run and handed back to the caller; nothing here
//! is persisted in the target database.

use serde::{Deserialize, Serialize};

/// Outcome of one attempted migration unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub unit_name: String,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_index: Option<usize>,
}

impl ExecutionResult {
    pub fn applied(unit_name: impl Into<String>) -> Self {
        Self {
            unit_name: unit_name.into(),
            applied: true,
            error: None,
            statement_index: None,
        }
    }

    pub fn failed(
        unit_name: impl Into<String>,
        error: impl Into<String>,
        statement_index: Option<usize>,
    ) -> Self {
        Self {
            unit_name: unit_name.into(),
            applied: false,
            error: Some(error.into()),
            statement_index,
        }
    }
}

/// Outcome of one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase_id: u32,
    pub success: bool,
    pub results: Vec<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<String>,
    /// Units applied by this phase were undone (transactional policy only)
    #[serde(default)]
    pub rolled_back: bool,
    /// Phase-level failure not attributable to one unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PhaseResult {
    pub fn new(phase_id: u32) -> Self {
        Self {
            phase_id,
            success: true,
            results: Vec::new(),
            stopped_at: None,
            rolled_back: false,
            error: None,
        }
    }

    /// Number of units that were applied
    pub fn applied_count(&self) -> usize {
        self.results.iter().filter(|r| r.applied).count()
    }

    /// The failing unit's result, if the phase stopped on one
    pub fn failure(&self) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| !r.applied)
    }
}

/// Outcome of a chain of phases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainResult {
    pub success: bool,
    pub phases: Vec<PhaseResult>,
}

impl ChainResult {
    /// The phase that stopped the chain, if any
    pub fn failed_phase(&self) -> Option<&PhaseResult> {
        self.phases.iter().find(|p| !p.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_result_serialization_omits_empty_fields() {
        let mut result = PhaseResult::new(1);
        result.results.push(ExecutionResult::applied("001_extensions"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["phase_id"], 1);
        assert_eq!(json["success"], true);
        assert!(json.get("stopped_at").is_none());
        assert!(json["results"][0].get("error").is_none());
    }

    #[test]
    fn test_failure_lookup() {
        let mut result = PhaseResult::new(2);
        result.results.push(ExecutionResult::applied("006_a"));
        result
            .results
            .push(ExecutionResult::failed("007_b", "syntax error", Some(1)));
        result.success = false;
        result.stopped_at = Some("007_b".to_string());

        assert_eq!(result.applied_count(), 1);
        let failure = result.failure().unwrap();
        assert_eq!(failure.unit_name, "007_b");
        assert_eq!(failure.statement_index, Some(1));

        let chain = ChainResult {
            success: false,
            phases: vec![result],
        };
        assert_eq!(chain.failed_phase().unwrap().phase_id, 2);
    }
}
