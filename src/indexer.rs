//! Joint index mapping over ordered discrete domains.
//!
//! A [`JointIndexer`] flattens a tuple of per-dimension indices into a single
//! joint index and back, using a fixed row-major stride table (the last
//! dimension varies fastest). The mapping is deterministic for the lifetime
//! of the indexer because domains are immutable.

use smallvec::SmallVec;

use crate::domain::DiscreteDomain;
use crate::errors::FactorError;

/// Inline capacity for per-dimension scratch; factors rarely exceed 8 edges.
pub(crate) type DimVec<T> = SmallVec<[T; 8]>;

/// Bidirectional mapping between index tuples and joint indices.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointIndexer {
    domains: Vec<DiscreteDomain>,
    strides: Vec<usize>,
    size: usize,
}

impl JointIndexer {
    /// Creates an indexer over an ordered sequence of domains.
    ///
    /// Fails with [`FactorError::Validation`] if the sequence is empty or the
    /// joint size overflows `usize`.
    pub fn new(domains: Vec<DiscreteDomain>) -> Result<Self, FactorError> {
        if domains.is_empty() {
            return Err(FactorError::Validation(
                "joint indexer requires at least one domain".into(),
            ));
        }
        let mut strides = vec![0usize; domains.len()];
        let mut size = 1usize;
        for (d, domain) in domains.iter().enumerate().rev() {
            strides[d] = size;
            size = size.checked_mul(domain.size()).ok_or_else(|| {
                FactorError::Validation("joint table size overflows usize".into())
            })?;
        }
        Ok(Self {
            domains,
            strides,
            size,
        })
    }

    /// Joint cardinality: the product of all domain sizes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of dimensions.
    pub fn num_dimensions(&self) -> usize {
        self.domains.len()
    }

    /// Cardinality of dimension `d`. Panics are avoided; out-of-range `d`
    /// yields a `Domain` error.
    pub fn dimension_size(&self, d: usize) -> Result<usize, FactorError> {
        self.domains
            .get(d)
            .map(DiscreteDomain::size)
            .ok_or_else(|| {
                FactorError::Domain(format!(
                    "dimension {} out of range for {} dimensions",
                    d,
                    self.domains.len()
                ))
            })
    }

    /// The domains, in dimension order.
    pub fn domains(&self) -> &[DiscreteDomain] {
        &self.domains
    }

    /// Row-major strides, one per dimension.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Maps a per-dimension index tuple to its joint index.
    ///
    /// Fails with [`FactorError::DimensionMismatch`] on wrong arity and
    /// [`FactorError::Domain`] if any index exceeds its dimension's
    /// cardinality.
    pub fn joint_from_indices(&self, indices: &[usize]) -> Result<usize, FactorError> {
        if indices.len() != self.domains.len() {
            return Err(FactorError::DimensionMismatch {
                expected: self.domains.len(),
                actual: indices.len(),
            });
        }
        let mut joint = 0usize;
        for (d, (&idx, domain)) in indices.iter().zip(&self.domains).enumerate() {
            if idx >= domain.size() {
                return Err(FactorError::Domain(format!(
                    "index {} out of range for dimension {} of size {}",
                    idx,
                    d,
                    domain.size()
                )));
            }
            joint += idx * self.strides[d];
        }
        Ok(joint)
    }

    /// Fills `out` with the per-dimension indices of `joint`.
    ///
    /// Fails with [`FactorError::Range`] if `joint >= size()` and
    /// [`FactorError::DimensionMismatch`] if `out` has the wrong arity.
    pub fn indices_from_joint(&self, joint: usize, out: &mut [usize]) -> Result<(), FactorError> {
        if joint >= self.size {
            return Err(FactorError::Range {
                index: joint,
                size: self.size,
            });
        }
        if out.len() != self.domains.len() {
            return Err(FactorError::DimensionMismatch {
                expected: self.domains.len(),
                actual: out.len(),
            });
        }
        let mut rest = joint;
        for (d, slot) in out.iter_mut().enumerate() {
            *slot = rest / self.strides[d];
            rest %= self.strides[d];
        }
        Ok(())
    }

    /// Allocating variant of [`indices_from_joint`](Self::indices_from_joint).
    pub fn tuple_from_joint(&self, joint: usize) -> Result<DimVec<usize>, FactorError> {
        let mut out: DimVec<usize> = smallvec::smallvec![0; self.domains.len()];
        self.indices_from_joint(joint, &mut out)?;
        Ok(out)
    }
}
