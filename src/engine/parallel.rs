//! Parallel round updates across independent factors.
//!
//! A [`FactorRuntime`] bundles one factor's table, wrapper, and edge buffers
//! under single ownership, so updating a slice of runtimes in parallel
//! trivially satisfies the one-writer-per-edge-slot contract: no two
//! runtimes share an outbound slot. With the `rayon` feature disabled the
//! round runs sequentially with identical results.

use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::engine::edges::EdgeBuffers;
use crate::engine::selector::UpdateConfig;
use crate::engine::wrapper::{TableWrapper, UpdateDiagnostics};
use crate::errors::FactorError;
use crate::table::FactorTable;

/// One factor's update state: shared read-mostly table, owned wrapper and
/// edge buffers.
#[derive(Debug, Clone)]
pub struct FactorRuntime {
    table: Arc<FactorTable>,
    wrapper: TableWrapper,
    edges: EdgeBuffers,
}

impl FactorRuntime {
    /// Builds and initializes a runtime for `table`. Edge buffers start
    /// uniform with the config's default damping on every port.
    pub fn new(table: Arc<FactorTable>, config: UpdateConfig) -> Result<Self, FactorError> {
        let config = config.validate()?;
        let sizes: Vec<usize> = table.indexer().domains().iter().map(|d| d.size()).collect();
        let edges = EdgeBuffers::new(&sizes, config.default_damping)?;
        let mut wrapper = TableWrapper::new(config)?;
        wrapper.initialize(&table)?;
        Ok(Self {
            table,
            wrapper,
            edges,
        })
    }

    /// The shared factor table.
    pub fn table(&self) -> &FactorTable {
        &self.table
    }

    /// The edge buffers.
    pub fn edges(&self) -> &EdgeBuffers {
        &self.edges
    }

    /// Mutable edge buffers, for feeding inbound messages between rounds.
    pub fn edges_mut(&mut self) -> &mut EdgeBuffers {
        &mut self.edges
    }

    /// The wrapper.
    pub fn wrapper(&self) -> &TableWrapper {
        &self.wrapper
    }

    /// Updates all of this factor's outbound messages once.
    pub fn update(&mut self) -> Result<UpdateDiagnostics, FactorError> {
        self.wrapper.update(&self.table, &mut self.edges)
    }
}

/// Updates every factor once, in parallel when the `rayon` feature is on.
///
/// Returns per-factor diagnostics in input order; the first error aborts the
/// round's result (remaining factors may still have been updated).
pub fn update_round(
    runtimes: &mut [FactorRuntime],
) -> Result<Vec<UpdateDiagnostics>, FactorError> {
    #[cfg(feature = "rayon")]
    {
        runtimes
            .par_iter_mut()
            .map(FactorRuntime::update)
            .collect()
    }
    #[cfg(not(feature = "rayon"))]
    {
        runtimes.iter_mut().map(FactorRuntime::update).collect()
    }
}
