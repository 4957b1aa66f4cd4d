//! Update steps: the shared-intermediate plan for computing all outbound
//! messages of one table factor.
//!
//! A naive sum-product update recomputes, for every out port, the product of
//! the table with every other port's inbound message: `O(ports × tableSize)`.
//! The [`UpdatePlan`] instead builds a binary split tree over the ports. Each
//! marginalization step folds one port's inbound message into the current
//! auxiliary table and removes that dimension; the two halves of the split
//! share the work of marginalizing each other out, so a full-factor update
//! visits the table `O(log ports)` times. Leaves over a single remaining
//! dimension become output steps.
//!
//! Sparse steps precompute, per source entry, the target entry position and
//! the removed dimension's message index, so no joint-index decomposition
//! happens at update time. All step structure is derived once per strategy
//! derivation and reused every round; only slot values are recomputed.

use rustc_hash::FxHashMap;

use crate::engine::edges::FactorEdges;
use crate::engine::selector::StrategyKind;
use crate::errors::FactorError;
use crate::indexer::DimVec;
use crate::table::{FactorTable, TableRepresentation};

/// Static structure of one auxiliary table in the plan.
#[derive(Debug, Clone)]
struct SlotSpec {
    /// Port numbers of the remaining dimensions, in order.
    dims: DimVec<usize>,
    /// Domain sizes matching `dims`.
    sizes: DimVec<usize>,
    storage: SlotStorage,
}

#[derive(Debug, Clone)]
enum SlotStorage {
    Dense { len: usize },
    /// Sorted unique joint indices w.r.t. this slot's own row-major layout.
    Sparse { joints: Vec<usize> },
}

impl SlotSpec {
    fn value_len(&self) -> usize {
        match &self.storage {
            SlotStorage::Dense { len } => *len,
            SlotStorage::Sparse { joints } => joints.len(),
        }
    }
}

/// How the root slot's values are gathered from the factor table each round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootFill {
    /// Copy the dense value array.
    DenseFromDense,
    /// Scatter sparse entries into a zeroed dense array.
    DenseFromSparse,
    /// Copy sparse entry weights in entry order.
    SparseFromSparse,
}

#[derive(Debug, Clone)]
enum PlanStep {
    DenseMarginalize {
        source: usize,
        target: usize,
        in_port: usize,
        outer: usize,
        dim_size: usize,
        inner: usize,
    },
    SparseMarginalize {
        source: usize,
        target: usize,
        in_port: usize,
        /// Per source entry: position in the target slot's entry list.
        entry_target: Vec<usize>,
        /// Per source entry: the removed dimension's index, used to pick the
        /// inbound message weight.
        entry_msg: Vec<usize>,
    },
    DenseOutput {
        source: usize,
        out_port: usize,
    },
    SparseOutput {
        source: usize,
        out_port: usize,
        /// Per source entry: the output variable's value index.
        entry_value: Vec<usize>,
    },
}

/// Precomputed update plan for one factor and one strategy.
#[derive(Debug, Clone)]
pub struct UpdatePlan {
    strategy: StrategyKind,
    slots: Vec<SlotSpec>,
    steps: Vec<PlanStep>,
    root_fill: RootFill,
}

impl UpdatePlan {
    /// Builds the split tree for `table` under `strategy`.
    ///
    /// A sparse strategy requires a sparse table: its fixed index set is what
    /// makes the precomputed entry maps stable across value-only writes.
    pub fn build(table: &FactorTable, strategy: StrategyKind) -> Result<Self, FactorError> {
        let dims: DimVec<usize> = (0..table.num_dimensions()).collect();
        let sizes: DimVec<usize> = table.indexer().domains().iter().map(|d| d.size()).collect();
        let (root_storage, root_fill) = match (strategy, table.representation()) {
            (StrategyKind::Dense, TableRepresentation::Dense) => (
                SlotStorage::Dense { len: table.size() },
                RootFill::DenseFromDense,
            ),
            (StrategyKind::Dense, TableRepresentation::Sparse) => (
                SlotStorage::Dense { len: table.size() },
                RootFill::DenseFromSparse,
            ),
            (StrategyKind::Sparse, TableRepresentation::Sparse) => {
                let (joints, _) = table
                    .sparse_entries()
                    .ok_or_else(|| FactorError::Structure("sparse entries unavailable".into()))?;
                (
                    SlotStorage::Sparse {
                        joints: joints.to_vec(),
                    },
                    RootFill::SparseFromSparse,
                )
            }
            (StrategyKind::Sparse, TableRepresentation::Dense) => {
                return Err(FactorError::Structure(
                    "sparse strategy requires a sparse table".into(),
                ))
            }
        };
        let mut plan = Self {
            strategy,
            slots: vec![SlotSpec {
                dims,
                sizes,
                storage: root_storage,
            }],
            steps: Vec::new(),
            root_fill,
        };
        plan.split(0);
        Ok(plan)
    }

    /// The strategy this plan was built for.
    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    /// Number of steps in the plan.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub(crate) fn slot_lens(&self) -> Vec<usize> {
        self.slots.iter().map(SlotSpec::value_len).collect()
    }

    fn split(&mut self, slot: usize) {
        let dims = self.slots[slot].dims.clone();
        if dims.len() == 1 {
            let out_port = dims[0];
            let step = match &self.slots[slot].storage {
                SlotStorage::Dense { .. } => PlanStep::DenseOutput {
                    source: slot,
                    out_port,
                },
                SlotStorage::Sparse { joints } => PlanStep::SparseOutput {
                    source: slot,
                    out_port,
                    entry_value: joints.clone(),
                },
            };
            self.steps.push(step);
            return;
        }
        let mid = dims.len() / 2;
        // Outputs in the right half need the left half marginalized out, and
        // vice versa; the shared source slot amortizes both sides.
        let mut cur = slot;
        for &port in &dims[..mid] {
            cur = self.add_marginalize(cur, port);
        }
        self.split(cur);
        let mut cur = slot;
        for &port in &dims[mid..] {
            cur = self.add_marginalize(cur, port);
        }
        self.split(cur);
    }

    /// Appends a step that folds `port`'s inbound message into `source` and
    /// removes that dimension; returns the new slot.
    fn add_marginalize(&mut self, source: usize, port: usize) -> usize {
        let spec = self.slots[source].clone();
        let pos = spec
            .dims
            .iter()
            .position(|&d| d == port)
            .unwrap_or_else(|| unreachable!("port {} not in slot dims", port));
        let dim_size = spec.sizes[pos];
        let inner: usize = spec.sizes[pos + 1..].iter().product();
        let outer: usize = spec.sizes[..pos].iter().product();
        let mut dims = spec.dims.clone();
        dims.remove(pos);
        let mut sizes = spec.sizes.clone();
        sizes.remove(pos);

        let target = self.slots.len();
        match &spec.storage {
            SlotStorage::Dense { .. } => {
                self.slots.push(SlotSpec {
                    dims,
                    sizes,
                    storage: SlotStorage::Dense { len: outer * inner },
                });
                self.steps.push(PlanStep::DenseMarginalize {
                    source,
                    target,
                    in_port: port,
                    outer,
                    dim_size,
                    inner,
                });
            }
            SlotStorage::Sparse { joints } => {
                let mut projected = Vec::with_capacity(joints.len());
                let mut entry_msg = Vec::with_capacity(joints.len());
                for &joint in joints {
                    let lo = joint % inner;
                    let k = (joint / inner) % dim_size;
                    let hi = joint / (inner * dim_size);
                    projected.push(hi * inner + lo);
                    entry_msg.push(k);
                }
                let mut unique = projected.clone();
                unique.sort_unstable();
                unique.dedup();
                let lookup: FxHashMap<usize, usize> = unique
                    .iter()
                    .enumerate()
                    .map(|(entry_pos, &joint)| (joint, entry_pos))
                    .collect();
                let entry_target = projected.iter().map(|joint| lookup[joint]).collect();
                self.slots.push(SlotSpec {
                    dims,
                    sizes,
                    storage: SlotStorage::Sparse { joints: unique },
                });
                self.steps.push(PlanStep::SparseMarginalize {
                    source,
                    target,
                    in_port: port,
                    entry_target,
                    entry_msg,
                });
            }
        }
        target
    }

    /// Runs all steps, leaving one raw (undamped, unnormalized) outbound
    /// message per port in `ws.raw_out`.
    pub(crate) fn execute<E: FactorEdges>(
        &self,
        table: &FactorTable,
        edges: &E,
        ws: &mut PlanWorkspace,
    ) -> Result<(), FactorError> {
        self.fill_root(table, &mut ws.slot_values[0])?;
        for step in &self.steps {
            match step {
                PlanStep::DenseMarginalize {
                    source,
                    target,
                    in_port,
                    outer,
                    dim_size,
                    inner,
                } => {
                    let (head, tail) = ws.slot_values.split_at_mut(*target);
                    let src = &head[*source];
                    let tgt = &mut tail[0];
                    tgt.fill(0.0);
                    let msg = edges.in_msg(*in_port);
                    for o in 0..*outer {
                        let tgt_base = o * inner;
                        for (k, &m) in msg.iter().enumerate().take(*dim_size) {
                            if m == 0.0 {
                                continue;
                            }
                            let src_base = (o * dim_size + k) * inner;
                            for i in 0..*inner {
                                tgt[tgt_base + i] += src[src_base + i] * m;
                            }
                        }
                    }
                }
                PlanStep::SparseMarginalize {
                    source,
                    target,
                    in_port,
                    entry_target,
                    entry_msg,
                } => {
                    let (head, tail) = ws.slot_values.split_at_mut(*target);
                    let src = &head[*source];
                    let tgt = &mut tail[0];
                    tgt.fill(0.0);
                    let msg = edges.in_msg(*in_port);
                    for ((&t, &k), &v) in entry_target.iter().zip(entry_msg).zip(src) {
                        tgt[t] += v * msg[k];
                    }
                }
                PlanStep::DenseOutput { source, out_port } => {
                    ws.raw_out[*out_port].copy_from_slice(&ws.slot_values[*source]);
                }
                PlanStep::SparseOutput {
                    source,
                    out_port,
                    entry_value,
                } => {
                    let raw = &mut ws.raw_out[*out_port];
                    raw.fill(0.0);
                    for (&value, &v) in entry_value.iter().zip(&ws.slot_values[*source]) {
                        raw[value] += v;
                    }
                }
            }
        }
        Ok(())
    }

    fn fill_root(&self, table: &FactorTable, root: &mut [f64]) -> Result<(), FactorError> {
        match self.root_fill {
            RootFill::DenseFromDense => {
                let values = table.dense_values().ok_or_else(stale_representation)?;
                root.copy_from_slice(values);
            }
            RootFill::DenseFromSparse => {
                let (joints, weights) = table.sparse_entries().ok_or_else(stale_representation)?;
                root.fill(0.0);
                for (&joint, &w) in joints.iter().zip(weights) {
                    root[joint] = w;
                }
            }
            RootFill::SparseFromSparse => {
                let (_, weights) = table.sparse_entries().ok_or_else(stale_representation)?;
                if weights.len() != root.len() {
                    return Err(stale_representation());
                }
                root.copy_from_slice(weights);
            }
        }
        Ok(())
    }
}

fn stale_representation() -> FactorError {
    FactorError::NotReady(
        "table representation changed since plan derivation; rebuild required".into(),
    )
}

/// Reusable per-round value storage for one plan.
#[derive(Debug, Clone)]
pub(crate) struct PlanWorkspace {
    slot_values: Vec<Vec<f64>>,
    /// Raw outbound message per port, before normalization and damping.
    pub(crate) raw_out: Vec<Vec<f64>>,
}

impl PlanWorkspace {
    pub(crate) fn for_plan(plan: &UpdatePlan, table: &FactorTable) -> Self {
        let slot_values = plan.slot_lens().into_iter().map(|n| vec![0.0; n]).collect();
        let raw_out = table
            .indexer()
            .domains()
            .iter()
            .map(|d| vec![0.0; d.size()])
            .collect();
        Self {
            slot_values,
            raw_out,
        }
    }
}

/// Direct per-port marginalization: the normal (unamortized) update, also
/// the reference the optimized plan is checked against.
///
/// Returns the raw outbound message for `out_port`: for each value `v` of
/// the output variable, the sum over all consistent rows of the table weight
/// times every other port's inbound message weight.
pub fn naive_output<E: FactorEdges>(
    table: &FactorTable,
    edges: &E,
    out_port: usize,
) -> Result<Vec<f64>, FactorError> {
    let n = table.num_dimensions();
    if edges.num_edges() != n {
        return Err(FactorError::DimensionMismatch {
            expected: n,
            actual: edges.num_edges(),
        });
    }
    if out_port >= n {
        return Err(FactorError::Domain(format!(
            "out port {} out of range for {} edges",
            out_port, n
        )));
    }
    let sizes: DimVec<usize> = table.indexer().domains().iter().map(|d| d.size()).collect();
    let mut out = vec![0.0; sizes[out_port]];

    let mut accumulate = |idx: &[usize], w: f64| {
        if w == 0.0 {
            return;
        }
        let mut product = w;
        for (port, &i) in idx.iter().enumerate() {
            if port != out_port {
                product *= edges.in_msg(port)[i];
            }
        }
        out[idx[out_port]] += product;
    };

    match table.dense_values() {
        Some(values) => {
            let mut idx: DimVec<usize> = smallvec::smallvec![0; n];
            for &w in values {
                accumulate(&idx, w);
                // Row-major odometer, last dimension fastest.
                for d in (0..n).rev() {
                    idx[d] += 1;
                    if idx[d] < sizes[d] {
                        break;
                    }
                    idx[d] = 0;
                }
            }
        }
        None => {
            let (joints, weights) = table
                .sparse_entries()
                .ok_or_else(|| FactorError::Structure("table has no storage".into()))?;
            let mut idx: DimVec<usize> = smallvec::smallvec![0; n];
            for (&joint, &w) in joints.iter().zip(weights) {
                table.indexer().indices_from_joint(joint, &mut idx)?;
                accumulate(&idx, w);
            }
        }
    }
    Ok(out)
}
