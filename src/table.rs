//! Discrete factor tables with tagged dense/sparse storage.
//!
//! A [`FactorTable`] holds one weight per joint index over a fixed sequence
//! of discrete domains. Storage is a tagged variant: dense (one value per
//! joint index) or sparse (sorted unique joint indices plus values, absent
//! entries weighing zero). Weights are the primary representation; energies
//! (`-ln weight`) are derived views. An optional directedness partition
//! switches [`normalize`](FactorTable::normalize) from global to conditional
//! semantics.
//!
//! Structure-changing mutations (representation conversion, sparse index-set
//! rebuild, directedness change) bump a structural version counter that the
//! update layer uses to detect staleness. Value-only writes do not.

use rustc_hash::FxHashMap;

use crate::domain::{DiscreteDomain, DomainValue};
use crate::errors::FactorError;
use crate::indexer::{DimVec, JointIndexer};

/// Weights below this are clamped when forming energies, so that underflow
/// never produces an infinite energy unless the weight is exactly zero.
pub const MIN_WEIGHT: f64 = 1e-300;

/// Storage tag for a factor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TableRepresentation {
    /// One weight per joint index, implicit ordering.
    Dense,
    /// Explicit (joint index, weight) entries; absent entries weigh zero.
    Sparse,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct SparseStorage {
    /// Sorted, unique joint indices.
    joints: Vec<usize>,
    /// Weight per entry, parallel to `joints`.
    weights: Vec<f64>,
    /// Joint index -> entry position.
    lookup: FxHashMap<usize, usize>,
}

impl SparseStorage {
    fn from_pairs(mut pairs: Vec<(usize, f64)>) -> Result<Self, FactorError> {
        pairs.sort_unstable_by_key(|&(joint, _)| joint);
        for window in pairs.windows(2) {
            if window[0].0 == window[1].0 {
                return Err(FactorError::Structure(format!(
                    "duplicate sparse entry for joint index {}",
                    window[0].0
                )));
            }
        }
        let joints: Vec<usize> = pairs.iter().map(|&(j, _)| j).collect();
        let weights: Vec<f64> = pairs.iter().map(|&(_, w)| w).collect();
        let lookup = joints
            .iter()
            .enumerate()
            .map(|(pos, &joint)| (joint, pos))
            .collect();
        Ok(Self {
            joints,
            weights,
            lookup,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
enum TableStorage {
    Dense(Vec<f64>),
    Sparse(SparseStorage),
}

/// A potential over a fixed tuple of discrete variables.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FactorTable {
    indexer: JointIndexer,
    storage: TableStorage,
    /// When directed, the "to" (output) dimensions; conditioning dimensions
    /// are the complement.
    directed_to: Option<Vec<usize>>,
    structure_version: u64,
}

impl FactorTable {
    /// Creates an all-zero dense table over `domains`.
    pub fn new_dense(domains: Vec<DiscreteDomain>) -> Result<Self, FactorError> {
        let indexer = JointIndexer::new(domains)?;
        let storage = TableStorage::Dense(vec![0.0; indexer.size()]);
        Ok(Self {
            indexer,
            storage,
            directed_to: None,
            structure_version: 0,
        })
    }

    /// Creates a dense table with explicit weights in joint-index order.
    pub fn from_dense_weights(
        domains: Vec<DiscreteDomain>,
        weights: Vec<f64>,
    ) -> Result<Self, FactorError> {
        let indexer = JointIndexer::new(domains)?;
        if weights.len() != indexer.size() {
            return Err(FactorError::DimensionMismatch {
                expected: indexer.size(),
                actual: weights.len(),
            });
        }
        Ok(Self {
            indexer,
            storage: TableStorage::Dense(weights),
            directed_to: None,
            structure_version: 0,
        })
    }

    /// Creates a sparse table from explicit index tuples and weights; every
    /// omitted tuple has weight zero. Tuples must be valid and unique.
    pub fn from_sparse(
        domains: Vec<DiscreteDomain>,
        tuples: &[&[usize]],
        weights: &[f64],
    ) -> Result<Self, FactorError> {
        let indexer = JointIndexer::new(domains)?;
        let storage = TableStorage::Sparse(Self::build_sparse(&indexer, tuples, weights)?);
        Ok(Self {
            indexer,
            storage,
            directed_to: None,
            structure_version: 0,
        })
    }

    fn build_sparse(
        indexer: &JointIndexer,
        tuples: &[&[usize]],
        weights: &[f64],
    ) -> Result<SparseStorage, FactorError> {
        if tuples.len() != weights.len() {
            return Err(FactorError::DimensionMismatch {
                expected: tuples.len(),
                actual: weights.len(),
            });
        }
        let mut pairs = Vec::with_capacity(tuples.len());
        for (tuple, &w) in tuples.iter().zip(weights) {
            pairs.push((indexer.joint_from_indices(tuple)?, w));
        }
        SparseStorage::from_pairs(pairs)
    }

    /// The table's joint indexer.
    pub fn indexer(&self) -> &JointIndexer {
        &self.indexer
    }

    /// Number of dimensions (edges) of the factor.
    pub fn num_dimensions(&self) -> usize {
        self.indexer.num_dimensions()
    }

    /// Joint cardinality.
    pub fn size(&self) -> usize {
        self.indexer.size()
    }

    /// Current storage tag. This is a hint for strategy selection; the
    /// update layer may run a different in-memory encoding for speed.
    pub fn representation(&self) -> TableRepresentation {
        match self.storage {
            TableStorage::Dense(_) => TableRepresentation::Dense,
            TableStorage::Sparse(_) => TableRepresentation::Sparse,
        }
    }

    /// Monotone counter bumped by structure-changing mutations.
    pub fn structure_version(&self) -> u64 {
        self.structure_version
    }

    /// The "to" dimensions when directed.
    pub fn directed_to(&self) -> Option<&[usize]> {
        self.directed_to.as_deref()
    }

    /// Number of structurally nonzero entries: explicit entries for sparse
    /// storage, nonzero values for dense.
    pub fn nonzero_count(&self) -> usize {
        match &self.storage {
            TableStorage::Dense(values) => values.iter().filter(|&&w| w != 0.0).count(),
            TableStorage::Sparse(sparse) => sparse.joints.len(),
        }
    }

    /// Fraction of the joint range that is structurally nonzero.
    pub fn density(&self) -> f64 {
        self.nonzero_count() as f64 / self.size() as f64
    }

    /// Dense values in joint-index order, when dense.
    pub fn dense_values(&self) -> Option<&[f64]> {
        match &self.storage {
            TableStorage::Dense(values) => Some(values),
            TableStorage::Sparse(_) => None,
        }
    }

    /// Sorted sparse joint indices and their weights, when sparse.
    pub fn sparse_entries(&self) -> Option<(&[usize], &[f64])> {
        match &self.storage {
            TableStorage::Dense(_) => None,
            TableStorage::Sparse(sparse) => Some((&sparse.joints, &sparse.weights)),
        }
    }

    /// Weight at a joint index; zero for absent sparse entries.
    pub fn weight_for_joint(&self, joint: usize) -> Result<f64, FactorError> {
        if joint >= self.size() {
            return Err(FactorError::Range {
                index: joint,
                size: self.size(),
            });
        }
        Ok(match &self.storage {
            TableStorage::Dense(values) => values[joint],
            TableStorage::Sparse(sparse) => sparse
                .lookup
                .get(&joint)
                .map_or(0.0, |&pos| sparse.weights[pos]),
        })
    }

    /// Weight at an index tuple.
    pub fn weight_for_indices(&self, indices: &[usize]) -> Result<f64, FactorError> {
        let joint = self.indexer.joint_from_indices(indices)?;
        self.weight_for_joint(joint)
    }

    /// Energy (`-ln weight`) at an index tuple; `+inf` at weight zero.
    pub fn energy_for_indices(&self, indices: &[usize]) -> Result<f64, FactorError> {
        Ok(energy_from_weight(self.weight_for_indices(indices)?))
    }

    /// Weight at a tuple of domain values.
    ///
    /// Fails with [`FactorError::Value`] if a value is not a member of its
    /// domain.
    pub fn weight_for_elements(&self, values: &[DomainValue]) -> Result<f64, FactorError> {
        let indices = self.resolve_elements(values)?;
        self.weight_for_indices(&indices)
    }

    /// Energy at a tuple of domain values.
    pub fn energy_for_elements(&self, values: &[DomainValue]) -> Result<f64, FactorError> {
        Ok(energy_from_weight(self.weight_for_elements(values)?))
    }

    fn resolve_elements(&self, values: &[DomainValue]) -> Result<DimVec<usize>, FactorError> {
        if values.len() != self.num_dimensions() {
            return Err(FactorError::DimensionMismatch {
                expected: self.num_dimensions(),
                actual: values.len(),
            });
        }
        values
            .iter()
            .zip(self.indexer.domains())
            .enumerate()
            .map(|(d, (value, domain))| {
                domain.index_of(value).ok_or_else(|| {
                    FactorError::Value(format!(
                        "{:?} is not a member of the domain of dimension {}",
                        value, d
                    ))
                })
            })
            .collect()
    }

    /// Sets the weight at an index tuple.
    ///
    /// Dense storage writes in place. Sparse storage updates an existing
    /// entry; writing a nonzero weight to an absent entry fails with
    /// [`FactorError::Structure`] because the sparse index set is fixed
    /// (rebuild it via [`set_weights_sparse`](Self::set_weights_sparse)).
    /// Writing zero to an absent entry is a no-op.
    pub fn set_weight_for_indices(
        &mut self,
        indices: &[usize],
        weight: f64,
    ) -> Result<(), FactorError> {
        let joint = self.indexer.joint_from_indices(indices)?;
        match &mut self.storage {
            TableStorage::Dense(values) => {
                values[joint] = weight;
                Ok(())
            }
            TableStorage::Sparse(sparse) => match sparse.lookup.get(&joint) {
                Some(&pos) => {
                    sparse.weights[pos] = weight;
                    Ok(())
                }
                None if weight == 0.0 => Ok(()),
                None => Err(FactorError::Structure(format!(
                    "joint index {} is outside the fixed sparse index set; \
                     rebuild via set_weights_sparse",
                    joint
                ))),
            },
        }
    }

    /// Sets the energy at an index tuple; `+inf` writes weight zero.
    pub fn set_energy_for_indices(
        &mut self,
        indices: &[usize],
        energy: f64,
    ) -> Result<(), FactorError> {
        self.set_weight_for_indices(indices, weight_from_energy(energy))
    }

    /// Replaces the sparse index set and weights in one structural rebuild.
    /// The table becomes sparse regardless of its prior representation.
    pub fn set_weights_sparse(
        &mut self,
        tuples: &[&[usize]],
        weights: &[f64],
    ) -> Result<(), FactorError> {
        let sparse = Self::build_sparse(&self.indexer, tuples, weights)?;
        self.storage = TableStorage::Sparse(sparse);
        self.structure_version += 1;
        Ok(())
    }

    /// Declares the table directed with the given "to" (output) dimensions,
    /// or undirected with `None`. Data layout is untouched; only subsequent
    /// [`normalize`](Self::normalize) semantics change.
    pub fn set_directed(&mut self, output_dimensions: Option<&[usize]>) -> Result<(), FactorError> {
        let directed_to = match output_dimensions {
            None => None,
            Some(dims) => {
                if dims.is_empty() {
                    return Err(FactorError::Validation(
                        "directed table requires at least one output dimension".into(),
                    ));
                }
                let mut sorted: Vec<usize> = dims.to_vec();
                sorted.sort_unstable();
                sorted.dedup();
                if sorted.len() != dims.len() {
                    return Err(FactorError::Validation(
                        "output dimensions must be distinct".into(),
                    ));
                }
                if let Some(&max) = sorted.last() {
                    if max >= self.num_dimensions() {
                        return Err(FactorError::Domain(format!(
                            "output dimension {} out of range for {} dimensions",
                            max,
                            self.num_dimensions()
                        )));
                    }
                }
                Some(sorted)
            }
        };
        if directed_to != self.directed_to {
            self.directed_to = directed_to;
            self.structure_version += 1;
        }
        Ok(())
    }

    /// Converts between dense and sparse storage. Dense to sparse keeps
    /// every nonzero entry; sparse to dense fills omitted entries with zero.
    /// Converting to the current representation is a no-op.
    pub fn set_representation(&mut self, kind: TableRepresentation) -> Result<(), FactorError> {
        if kind == self.representation() {
            return Ok(());
        }
        match (&self.storage, kind) {
            (TableStorage::Dense(values), TableRepresentation::Sparse) => {
                let pairs: Vec<(usize, f64)> = values
                    .iter()
                    .enumerate()
                    .filter(|&(_, &w)| w != 0.0)
                    .map(|(joint, &w)| (joint, w))
                    .collect();
                self.storage = TableStorage::Sparse(SparseStorage::from_pairs(pairs)?);
            }
            (TableStorage::Sparse(sparse), TableRepresentation::Dense) => {
                let mut values = vec![0.0; self.indexer.size()];
                for (&joint, &w) in sparse.joints.iter().zip(&sparse.weights) {
                    values[joint] = w;
                }
                self.storage = TableStorage::Dense(values);
            }
            _ => unreachable!("conversion to current representation is a no-op"),
        }
        self.structure_version += 1;
        Ok(())
    }

    /// Rescales weights to sum to one: globally when undirected, per
    /// conditioning combination when directed (each "from" combination's
    /// "to" slice sums to one).
    ///
    /// Fails with [`FactorError::DegenerateTable`] if any conditioning slice
    /// (or the whole table, when undirected) sums to zero; on failure the
    /// table is unchanged.
    pub fn normalize(&mut self) -> Result<(), FactorError> {
        let from_dims: Vec<usize> = match &self.directed_to {
            None => Vec::new(),
            Some(to) => (0..self.num_dimensions())
                .filter(|d| !to.contains(d))
                .collect(),
        };
        if from_dims.is_empty() {
            // Undirected, or directed with every dimension an output.
            let total: f64 = match &self.storage {
                TableStorage::Dense(values) => values.iter().sum(),
                TableStorage::Sparse(sparse) => sparse.weights.iter().sum(),
            };
            if total <= 0.0 || !total.is_finite() {
                return Err(FactorError::DegenerateTable(format!(
                    "cannot normalize table with weight sum {}",
                    total
                )));
            }
            match &mut self.storage {
                TableStorage::Dense(values) => values.iter_mut().for_each(|w| *w /= total),
                TableStorage::Sparse(sparse) => {
                    sparse.weights.iter_mut().for_each(|w| *w /= total)
                }
            }
            return Ok(());
        }

        let projector = Projector::new(&self.indexer, &from_dims);
        let mut sums = vec![0.0f64; projector.size()];
        match &self.storage {
            TableStorage::Dense(values) => {
                for (joint, &w) in values.iter().enumerate() {
                    sums[projector.project(joint)] += w;
                }
            }
            TableStorage::Sparse(sparse) => {
                for (&joint, &w) in sparse.joints.iter().zip(&sparse.weights) {
                    sums[projector.project(joint)] += w;
                }
            }
        }
        if let Some(row) = sums.iter().position(|&s| s <= 0.0 || !s.is_finite()) {
            return Err(FactorError::DegenerateTable(format!(
                "conditioning combination {} has weight sum {}",
                row, sums[row]
            )));
        }
        match &mut self.storage {
            TableStorage::Dense(values) => {
                for (joint, w) in values.iter_mut().enumerate() {
                    *w /= sums[projector.project(joint)];
                }
            }
            TableStorage::Sparse(sparse) => {
                for (&joint, w) in sparse.joints.iter().zip(sparse.weights.iter_mut()) {
                    *w /= sums[projector.project(joint)];
                }
            }
        }
        Ok(())
    }
}

/// Maps a full joint index onto the joint index of a dimension subset.
pub(crate) struct Projector {
    /// (full stride, dimension size, projected stride) per kept dimension.
    dims: DimVec<(usize, usize, usize)>,
    size: usize,
}

impl Projector {
    pub(crate) fn new(indexer: &JointIndexer, keep: &[usize]) -> Self {
        let mut dims: DimVec<(usize, usize, usize)> = DimVec::new();
        let mut size = 1usize;
        for &d in keep.iter().rev() {
            let card = indexer.domains()[d].size();
            dims.push((indexer.strides()[d], card, size));
            size *= card;
        }
        dims.reverse();
        Self { dims, size }
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn project(&self, joint: usize) -> usize {
        self.dims
            .iter()
            .map(|&(stride, card, proj_stride)| ((joint / stride) % card) * proj_stride)
            .sum()
    }
}

/// Energy of a weight: `-ln w`, `+inf` at exactly zero, with sub-normal
/// weights clamped to [`MIN_WEIGHT`] so underflow cannot manufacture an
/// infinite energy.
pub fn energy_from_weight(weight: f64) -> f64 {
    if weight == 0.0 {
        f64::INFINITY
    } else {
        -weight.max(MIN_WEIGHT).ln()
    }
}

/// Weight of an energy: `exp(-e)`, zero at `+inf`.
pub fn weight_from_energy(energy: f64) -> f64 {
    if energy == f64::INFINITY {
        0.0
    } else {
        (-energy).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(sizes: &[usize]) -> Vec<DiscreteDomain> {
        sizes
            .iter()
            .map(|&n| DiscreteDomain::range(n).unwrap())
            .collect()
    }

    #[test]
    fn dense_lookup_and_write() {
        let mut t =
            FactorTable::from_dense_weights(domains(&[2, 2]), vec![2.0, 1.0, 1.0, 2.0]).unwrap();
        assert_eq!(t.weight_for_indices(&[0, 0]).unwrap(), 2.0);
        t.set_weight_for_indices(&[0, 1], 5.0).unwrap();
        assert_eq!(t.weight_for_indices(&[0, 1]).unwrap(), 5.0);
        // Value-only write must not bump the structural version.
        assert_eq!(t.structure_version(), 0);
    }

    #[test]
    fn sparse_absent_is_zero_and_fixed() {
        let mut t = FactorTable::from_sparse(
            domains(&[2, 2]),
            &[&[0, 0], &[1, 1]],
            &[2.0, 2.0],
        )
        .unwrap();
        assert_eq!(t.weight_for_indices(&[0, 1]).unwrap(), 0.0);
        assert_eq!(t.nonzero_count(), 2);
        // Updating an existing entry is fine.
        t.set_weight_for_indices(&[0, 0], 3.0).unwrap();
        // Zero to an absent entry is a no-op.
        t.set_weight_for_indices(&[1, 0], 0.0).unwrap();
        // Nonzero to an absent entry is a structural violation.
        assert!(matches!(
            t.set_weight_for_indices(&[1, 0], 1.0),
            Err(FactorError::Structure(_))
        ));
        assert_eq!(t.structure_version(), 0);
    }

    #[test]
    fn representation_roundtrip_preserves_nonzeros() {
        let weights = vec![0.0, 3.0, 0.0, 0.5, 0.0, 7.0];
        let mut t = FactorTable::from_dense_weights(domains(&[2, 3]), weights.clone()).unwrap();
        t.set_representation(TableRepresentation::Sparse).unwrap();
        assert_eq!(t.nonzero_count(), 3);
        assert_eq!(t.structure_version(), 1);
        t.set_representation(TableRepresentation::Dense).unwrap();
        assert_eq!(t.dense_values().unwrap(), weights.as_slice());
        assert_eq!(t.structure_version(), 2);
    }

    #[test]
    fn undirected_normalize_sums_to_one() {
        let mut t =
            FactorTable::from_dense_weights(domains(&[2, 2]), vec![2.0, 1.0, 1.0, 2.0]).unwrap();
        t.normalize().unwrap();
        let total: f64 = t.dense_values().unwrap().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn directed_normalize_is_conditional() {
        // Dimension 1 is the output; each row over dimension 0 must sum to 1.
        let mut t =
            FactorTable::from_dense_weights(domains(&[2, 2]), vec![1.0, 3.0, 2.0, 2.0]).unwrap();
        t.set_directed(Some(&[1])).unwrap();
        t.normalize().unwrap();
        let v = t.dense_values().unwrap();
        assert!((v[0] + v[1] - 1.0).abs() < 1e-12);
        assert!((v[2] + v[3] - 1.0).abs() < 1e-12);
        assert!((v[0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn directed_normalize_zero_row_fails_atomically() {
        let mut t =
            FactorTable::from_dense_weights(domains(&[2, 2]), vec![1.0, 3.0, 0.0, 0.0]).unwrap();
        t.set_directed(Some(&[1])).unwrap();
        let before = t.clone();
        assert!(matches!(
            t.normalize(),
            Err(FactorError::DegenerateTable(_))
        ));
        assert_eq!(t, before);
    }

    #[test]
    fn elements_resolve_through_domains() {
        let doms = vec![
            DiscreteDomain::new(vec![DomainValue::symbol("a"), DomainValue::symbol("b")]).unwrap(),
            DiscreteDomain::range(2).unwrap(),
        ];
        let t = FactorTable::from_dense_weights(doms, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(
            t.weight_for_elements(&[DomainValue::symbol("b"), DomainValue::Int(0)])
                .unwrap(),
            3.0
        );
        assert!(matches!(
            t.weight_for_elements(&[DomainValue::symbol("c"), DomainValue::Int(0)]),
            Err(FactorError::Value(_))
        ));
    }

    #[test]
    fn energy_weight_relation() {
        let mut t = FactorTable::new_dense(domains(&[2])).unwrap();
        t.set_energy_for_indices(&[0], 0.0).unwrap();
        assert_eq!(t.weight_for_indices(&[0]).unwrap(), 1.0);
        assert_eq!(t.energy_for_indices(&[1]).unwrap(), f64::INFINITY);
        t.set_energy_for_indices(&[1], f64::INFINITY).unwrap();
        assert_eq!(t.weight_for_indices(&[1]).unwrap(), 0.0);
    }

    #[test]
    fn set_weights_sparse_rebuilds_structure() {
        let mut t =
            FactorTable::from_sparse(domains(&[2, 2]), &[&[0, 0]], &[1.0]).unwrap();
        let v0 = t.structure_version();
        t.set_weights_sparse(&[&[0, 1], &[1, 0]], &[0.5, 0.5]).unwrap();
        assert_eq!(t.structure_version(), v0 + 1);
        assert_eq!(t.weight_for_indices(&[0, 0]).unwrap(), 0.0);
        assert_eq!(t.weight_for_indices(&[0, 1]).unwrap(), 0.5);
    }

    #[test]
    fn directedness_change_bumps_version() {
        let mut t = FactorTable::new_dense(domains(&[2, 2])).unwrap();
        t.set_directed(Some(&[1])).unwrap();
        assert_eq!(t.structure_version(), 1);
        // No-op redeclaration does not bump.
        t.set_directed(Some(&[1])).unwrap();
        assert_eq!(t.structure_version(), 1);
        assert!(t.set_directed(Some(&[2])).is_err());
        assert!(t.set_directed(Some(&[])).is_err());
    }
}
