//! Phase chain coordinator
//!
//! Runs phases strictly in listed order and stops after the first failed
//! phase: later phases reference objects their predecessors create, so
//! running them after a failure can only make things worse.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::result::{Error, Result};
use crate::domain::{ChainResult, Phase, PhaseResult};
use crate::ports::SqlExecutor;
use crate::services::runner::PhaseRunner;

/// What a caller asked to run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Invocation {
    /// Start at this phase (the whole chain when absent)
    pub phase: Option<u32>,
    /// Run only `phase`, without chaining into its successors
    pub single: bool,
    /// Caller asserts that predecessors outside this invocation already
    /// succeeded in a prior invocation
    pub predecessors_applied: bool,
}

/// Result of an invocation: a whole chain, or one phase for single-phase runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum InvocationOutcome {
    Chain(ChainResult),
    Phase(PhaseResult),
}

impl InvocationOutcome {
    pub fn success(&self) -> bool {
        match self {
            Self::Chain(chain) => chain.success,
            Self::Phase(phase) => phase.success,
        }
    }

    /// Phase results in execution order
    pub fn phases(&self) -> Vec<&PhaseResult> {
        match self {
            Self::Chain(chain) => chain.phases.iter().collect(),
            Self::Phase(phase) => vec![phase],
        }
    }
}

/// Sequences phase runners
#[derive(Debug, Clone, Default)]
pub struct ChainCoordinator {
    runner: PhaseRunner,
}

impl ChainCoordinator {
    pub fn new(runner: PhaseRunner) -> Self {
        Self { runner }
    }

    /// Check the predecessor rule for `phases` before anything runs.
    ///
    /// A predecessor must appear earlier in the list, or, when it is not in
    /// the list at all, the caller must assert it was applied before.
    pub fn validate_order(phases: &[Phase], predecessors_applied: bool) -> Result<()> {
        let listed: HashSet<u32> = phases.iter().map(|p| p.id).collect();
        let mut seen = HashSet::new();

        for phase in phases {
            if !seen.insert(phase.id) {
                return Err(Error::PhaseOrder(format!(
                    "phase {} is listed twice",
                    phase.id
                )));
            }
            let Some(predecessor) = phase.predecessor else {
                continue;
            };
            if seen.contains(&predecessor) {
                continue;
            }
            if listed.contains(&predecessor) {
                return Err(Error::PhaseOrder(format!(
                    "phase {} is listed before its predecessor {}",
                    phase.id, predecessor
                )));
            }
            if !predecessors_applied {
                return Err(Error::PhaseOrder(format!(
                    "phase {} requires phase {} to have succeeded; run it first or assert it was applied",
                    phase.id, predecessor
                )));
            }
        }
        Ok(())
    }

    /// Run `phases` in order, stopping after the first failure.
    ///
    /// The returned result only holds the phases that were attempted.
    pub async fn run_chain(
        &self,
        phases: &[Phase],
        executor: &mut dyn SqlExecutor,
        predecessors_applied: bool,
    ) -> Result<ChainResult> {
        Self::validate_order(phases, predecessors_applied)?;

        let mut chain = ChainResult {
            success: true,
            phases: Vec::with_capacity(phases.len()),
        };

        for phase in phases {
            let result = self.runner.run(phase, executor).await;
            let failed = !result.success;
            chain.phases.push(result);
            if failed {
                info!(phase = phase.id, "chain stopped");
                chain.success = false;
                break;
            }
        }

        Ok(chain)
    }

    /// Run exactly one phase under the same predecessor rule
    pub async fn run_single(
        &self,
        phase: &Phase,
        executor: &mut dyn SqlExecutor,
        predecessors_applied: bool,
    ) -> Result<PhaseResult> {
        Self::validate_order(std::slice::from_ref(phase), predecessors_applied)?;
        Ok(self.runner.run(phase, executor).await)
    }

    /// Run the suffix of `all_phases` starting at `phase_id`
    pub async fn run_from(
        &self,
        all_phases: &[Phase],
        phase_id: u32,
        executor: &mut dyn SqlExecutor,
        predecessors_applied: bool,
    ) -> Result<ChainResult> {
        let invocation = Invocation {
            phase: Some(phase_id),
            single: false,
            predecessors_applied,
        };
        let suffix = select_phases(all_phases, &invocation)?;
        self.run_chain(suffix, executor, predecessors_applied).await
    }

    /// Resolve an invocation against the full chain and run it
    pub async fn invoke(
        &self,
        all_phases: &[Phase],
        invocation: &Invocation,
        executor: &mut dyn SqlExecutor,
    ) -> Result<InvocationOutcome> {
        let selected = select_phases(all_phases, invocation)?;
        if invocation.single {
            let phase = selected
                .first()
                .ok_or_else(|| Error::validation("single-phase run needs a phase"))?;
            let result = self
                .run_single(phase, executor, invocation.predecessors_applied)
                .await?;
            return Ok(InvocationOutcome::Phase(result));
        }

        let chain = self
            .run_chain(selected, executor, invocation.predecessors_applied)
            .await?;
        Ok(InvocationOutcome::Chain(chain))
    }
}

/// The slice of `all_phases` an invocation covers
pub fn select_phases<'a>(all_phases: &'a [Phase], invocation: &Invocation) -> Result<&'a [Phase]> {
    let Some(id) = invocation.phase else {
        if invocation.single {
            return Err(Error::validation("single-phase run needs a phase"));
        }
        return Ok(all_phases);
    };

    let start = all_phases
        .iter()
        .position(|p| p.id == id)
        .ok_or_else(|| Error::validation(format!("unknown phase {}", id)))?;

    if invocation.single {
        Ok(&all_phases[start..=start])
    } else {
        Ok(&all_phases[start..])
    }
}
