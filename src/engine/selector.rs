//! Strategy selection for table-factor updates.
//!
//! Selection is a pure function of the factor table's dimensions and density
//! plus a validated configuration value; no ambient globals. It runs only
//! when a [`TableWrapper`](crate::engine::wrapper::TableWrapper) derives or
//! re-derives its update plan.

use crate::errors::FactorError;
use crate::table::{FactorTable, TableRepresentation};

/// Storage encoding used by the update steps for one factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Iterate the full joint range.
    Dense,
    /// Iterate only structurally nonzero entries.
    Sparse,
}

/// How a factor's outbound messages are computed each round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateApproach {
    /// Pick normal or optimized per factor from cost estimates.
    #[default]
    Automatic,
    /// Direct per-port marginalization, no shared intermediates.
    Normal,
    /// Shared-intermediate update plan amortized across ports.
    Optimized,
}

/// Configuration for the update layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateConfig {
    /// Density below which sparse strategies are chosen for sparse tables.
    pub sparse_threshold: f64,
    /// Update approach override.
    pub approach: UpdateApproach,
    /// Damping factor used by [`EdgeBuffers`](crate::engine::edges::EdgeBuffers)
    /// built through [`FactorRuntime`](crate::engine::parallel::FactorRuntime).
    /// Valid range is `[0, 1)`: the `λ = 1` endpoint would freeze messages at
    /// their previous values forever and is deliberately rejected by
    /// [`validate`](Self::validate).
    pub default_damping: f64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            sparse_threshold: 1.0,
            approach: UpdateApproach::Automatic,
            default_damping: 0.0,
        }
    }
}

impl UpdateConfig {
    /// Validates field ranges, returning the config on success.
    pub fn validate(self) -> Result<Self, FactorError> {
        if !(0.0..=1.0).contains(&self.sparse_threshold) {
            return Err(FactorError::Validation(
                "sparse_threshold must be in [0, 1]".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.default_damping) {
            return Err(FactorError::Validation(
                "default_damping must be in [0, 1)".into(),
            ));
        }
        Ok(self)
    }
}

/// Chooses the step encoding for one factor.
///
/// Sparse strategies are only sound when the table itself is sparse: the
/// sparse index set is then fixed, so value-only writes cannot invalidate the
/// precomputed entry maps. A sparse table still gets dense strategies when
/// its density reaches the threshold.
pub fn select_strategy(table: &FactorTable, config: &UpdateConfig) -> StrategyKind {
    match table.representation() {
        TableRepresentation::Dense => StrategyKind::Dense,
        TableRepresentation::Sparse => {
            if table.density() < config.sparse_threshold {
                StrategyKind::Sparse
            } else {
                StrategyKind::Dense
            }
        }
    }
}

/// Rough per-round cost of an update approach, in visited table entries and
/// auxiliary memory entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostEstimate {
    /// Auxiliary values held across the round.
    pub memory_entries: usize,
    /// Table entries visited per round.
    pub execution_ops: usize,
}

/// Estimates the per-round cost of the normal (per-port) approach.
pub fn estimate_normal_cost(table: &FactorTable, strategy: StrategyKind) -> CostEstimate {
    let entries = match strategy {
        StrategyKind::Dense => table.size(),
        StrategyKind::Sparse => table.nonzero_count(),
    };
    let ports = table.num_dimensions();
    CostEstimate {
        memory_entries: 0,
        // Each port scans the table once, forming a product over the other
        // ports per entry.
        execution_ops: ports * entries * ports.saturating_sub(1).max(1),
    }
}

/// Estimates the per-round cost of the optimized (shared-intermediate)
/// approach: the split tree visits the table O(log ports) times.
pub fn estimate_optimized_cost(table: &FactorTable, strategy: StrategyKind) -> CostEstimate {
    let entries = match strategy {
        StrategyKind::Dense => table.size(),
        StrategyKind::Sparse => table.nonzero_count(),
    };
    let ports = table.num_dimensions();
    // floor(log2(ports)) + 1: the number of table passes in the split tree.
    let depth = usize::BITS as usize - ports.leading_zeros() as usize;
    CostEstimate {
        memory_entries: 2 * entries,
        execution_ops: 2 * entries * depth.max(1),
    }
}

/// Resolves [`UpdateApproach::Automatic`] for one factor by comparing cost
/// estimates; explicit approaches pass through.
pub fn resolve_approach(
    table: &FactorTable,
    strategy: StrategyKind,
    config: &UpdateConfig,
) -> UpdateApproach {
    match config.approach {
        UpdateApproach::Normal => UpdateApproach::Normal,
        UpdateApproach::Optimized => UpdateApproach::Optimized,
        UpdateApproach::Automatic => {
            let normal = estimate_normal_cost(table, strategy);
            let optimized = estimate_optimized_cost(table, strategy);
            if optimized.execution_ops < normal.execution_ops {
                UpdateApproach::Optimized
            } else {
                UpdateApproach::Normal
            }
        }
    }
}
