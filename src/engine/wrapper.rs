//! Per-factor update coordinator.
//!
//! A [`TableWrapper`] owns the strategy chosen for one factor, the
//! precomputed update plan, and the reusable workspace. It follows a small
//! state machine: `Uninitialized → Ready → Stale → Ready → ...`. Structure
//! changes on the factor table (detected through its structural version
//! counter) move the wrapper to `Stale`; only an explicit
//! [`rebuild`](TableWrapper::rebuild) re-derives the strategy. Value-only
//! writes are picked up transparently because values are re-read each round.

use crate::engine::edges::FactorEdges;
use crate::engine::selector::{
    resolve_approach, select_strategy, StrategyKind, UpdateApproach, UpdateConfig,
};
use crate::engine::steps::{naive_output, PlanWorkspace, UpdatePlan};
use crate::errors::FactorError;
use crate::table::FactorTable;

/// Lifecycle state of a [`TableWrapper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperState {
    /// No strategy derived yet.
    Uninitialized,
    /// Strategy and plan are valid for the table's current structure.
    Ready,
    /// The table's structure changed; a rebuild is required.
    Stale,
}

/// Per-round diagnostics, returned as a value rather than logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateDiagnostics {
    /// Step encoding chosen at derivation.
    pub strategy: StrategyKind,
    /// Approach actually run (`Normal` or `Optimized`).
    pub approach: UpdateApproach,
    /// Plan steps executed; zero for the normal approach.
    pub step_count: usize,
    /// Number of edges updated.
    pub ports: usize,
}

/// Coordinator that computes all outbound messages of one factor per round.
#[derive(Debug, Clone)]
pub struct TableWrapper {
    config: UpdateConfig,
    state: WrapperState,
    strategy: StrategyKind,
    approach: UpdateApproach,
    plan: Option<UpdatePlan>,
    workspace: Option<PlanWorkspace>,
    seen_version: u64,
}

impl TableWrapper {
    /// Creates an uninitialized wrapper with a validated configuration.
    pub fn new(config: UpdateConfig) -> Result<Self, FactorError> {
        let config = config.validate()?;
        Ok(Self {
            config,
            state: WrapperState::Uninitialized,
            strategy: StrategyKind::Dense,
            approach: UpdateApproach::Normal,
            plan: None,
            workspace: None,
            seen_version: 0,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WrapperState {
        self.state
    }

    /// Strategy chosen at the last derivation, if any.
    pub fn strategy(&self) -> Option<StrategyKind> {
        match self.state {
            WrapperState::Uninitialized => None,
            _ => Some(self.strategy),
        }
    }

    /// Derives the strategy and plan for `table` on first attach.
    pub fn initialize(&mut self, table: &FactorTable) -> Result<(), FactorError> {
        self.derive(table)
    }

    /// Re-derives after a structural change; same work as the initial attach.
    pub fn rebuild(&mut self, table: &FactorTable) -> Result<(), FactorError> {
        self.derive(table)
    }

    fn derive(&mut self, table: &FactorTable) -> Result<(), FactorError> {
        let strategy = select_strategy(table, &self.config);
        let approach = resolve_approach(table, strategy, &self.config);
        let (plan, workspace) = match approach {
            UpdateApproach::Optimized => {
                let plan = UpdatePlan::build(table, strategy)?;
                let workspace = PlanWorkspace::for_plan(&plan, table);
                (Some(plan), Some(workspace))
            }
            _ => (None, None),
        };
        self.strategy = strategy;
        self.approach = match approach {
            UpdateApproach::Automatic => unreachable!("resolve_approach returns a concrete approach"),
            concrete => concrete,
        };
        self.plan = plan;
        self.workspace = workspace;
        self.seen_version = table.structure_version();
        self.state = WrapperState::Ready;
        Ok(())
    }

    fn check_ready(&mut self, table: &FactorTable) -> Result<(), FactorError> {
        match self.state {
            WrapperState::Uninitialized => {
                return Err(FactorError::NotReady(
                    "wrapper has not been initialized".into(),
                ))
            }
            WrapperState::Stale => {
                return Err(FactorError::NotReady(
                    "table structure changed; rebuild required".into(),
                ))
            }
            WrapperState::Ready => {}
        }
        if table.structure_version() != self.seen_version {
            self.state = WrapperState::Stale;
            return Err(FactorError::NotReady(
                "table structure changed; rebuild required".into(),
            ));
        }
        Ok(())
    }

    fn check_edges<E: FactorEdges>(
        table: &FactorTable,
        edges: &E,
    ) -> Result<(), FactorError> {
        let n = table.num_dimensions();
        if edges.num_edges() != n {
            return Err(FactorError::DimensionMismatch {
                expected: n,
                actual: edges.num_edges(),
            });
        }
        for (port, domain) in table.indexer().domains().iter().enumerate() {
            if edges.in_msg(port).len() != domain.size() {
                return Err(FactorError::DimensionMismatch {
                    expected: domain.size(),
                    actual: edges.in_msg(port).len(),
                });
            }
            if edges.out_msg(port).len() != domain.size() {
                return Err(FactorError::DimensionMismatch {
                    expected: domain.size(),
                    actual: edges.out_msg(port).len(),
                });
            }
        }
        Ok(())
    }

    /// Computes and publishes all outbound messages for one round.
    ///
    /// Each message is fully computed (and normalized to sum to one, when its
    /// mass is nonzero) before it is written into the edge's outbound slot;
    /// damping blends it with the slot's previous content per port. Repeated
    /// calls with unchanged inbound messages and zero damping produce
    /// identical outputs.
    pub fn update<E: FactorEdges>(
        &mut self,
        table: &FactorTable,
        edges: &mut E,
    ) -> Result<UpdateDiagnostics, FactorError> {
        self.check_ready(table)?;
        Self::check_edges(table, edges)?;

        let ports = table.num_dimensions();
        let diagnostics = UpdateDiagnostics {
            strategy: self.strategy,
            approach: self.approach,
            step_count: self.plan.as_ref().map_or(0, UpdatePlan::step_count),
            ports,
        };

        match (&self.plan, &mut self.workspace) {
            (Some(plan), Some(ws)) => {
                plan.execute(table, edges, ws)?;
                for port in 0..ports {
                    publish(&ws.raw_out[port], edges, port);
                }
            }
            _ => {
                for port in 0..ports {
                    let raw = naive_output(table, edges, port)?;
                    publish(&raw, edges, port);
                }
            }
        }
        Ok(diagnostics)
    }

    /// Computes and publishes the outbound message for a single port, using
    /// the direct per-port marginalization.
    pub fn update_edge<E: FactorEdges>(
        &mut self,
        table: &FactorTable,
        edges: &mut E,
        port: usize,
    ) -> Result<(), FactorError> {
        self.check_ready(table)?;
        Self::check_edges(table, edges)?;
        let raw = naive_output(table, edges, port)?;
        publish(&raw, edges, port);
        Ok(())
    }
}

/// Normalizes `raw` and blends it into the port's outbound slot under the
/// port's damping factor. An all-zero raw message is published unnormalized.
fn publish<E: FactorEdges>(raw: &[f64], edges: &mut E, port: usize) {
    let total: f64 = raw.iter().sum();
    let scale = if total > 0.0 { 1.0 / total } else { 1.0 };
    let lambda = if edges.is_damping_in_use() {
        edges.damping(port)
    } else {
        0.0
    };
    let out = edges.out_msg_mut(port);
    if lambda == 0.0 {
        for (slot, &r) in out.iter_mut().zip(raw) {
            *slot = r * scale;
        }
    } else {
        for (slot, &r) in out.iter_mut().zip(raw) {
            *slot = lambda * *slot + (1.0 - lambda) * r * scale;
        }
    }
}
