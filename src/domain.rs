//! Discrete variable domains.
//!
//! A [`DiscreteDomain`] is the ordered, finite set of values a discrete
//! variable can take. Domains are immutable once constructed; every joint
//! indexing structure in the crate is derived from them.

use std::sync::Arc;

use crate::errors::FactorError;

/// A single value a discrete variable can take.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DomainValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Real value. NaN is rejected at domain construction because it can
    /// never be looked up by equality.
    Real(f64),
    /// Symbolic value.
    Symbol(Arc<str>),
}

impl DomainValue {
    /// Convenience constructor for symbolic values.
    pub fn symbol(s: &str) -> Self {
        DomainValue::Symbol(Arc::from(s))
    }
}

/// An ordered, finite set of distinct values for one discrete variable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscreteDomain {
    values: Vec<DomainValue>,
}

impl DiscreteDomain {
    /// Creates a domain from an ordered list of distinct values.
    ///
    /// Fails with [`FactorError::Domain`] if the list is empty, contains
    /// duplicates, or contains a NaN real.
    pub fn new(values: Vec<DomainValue>) -> Result<Self, FactorError> {
        if values.is_empty() {
            return Err(FactorError::Domain("domain must not be empty".into()));
        }
        for (i, v) in values.iter().enumerate() {
            if let DomainValue::Real(r) = v {
                if r.is_nan() {
                    return Err(FactorError::Domain(
                        "NaN is not a valid domain value".into(),
                    ));
                }
            }
            if values[..i].contains(v) {
                return Err(FactorError::Domain(format!(
                    "duplicate domain value at position {}: {:?}",
                    i, v
                )));
            }
        }
        Ok(Self { values })
    }

    /// Creates the integer domain `{0, 1, ..., n-1}`.
    ///
    /// Fails with [`FactorError::Domain`] if `n == 0`.
    pub fn range(n: usize) -> Result<Self, FactorError> {
        Self::new((0..n).map(|i| DomainValue::Int(i as i64)).collect())
    }

    /// Number of values in the domain.
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// The value at position `index`, or [`FactorError::Domain`] if out of
    /// range.
    pub fn value(&self, index: usize) -> Result<&DomainValue, FactorError> {
        self.values.get(index).ok_or_else(|| {
            FactorError::Domain(format!(
                "index {} out of range for domain of size {}",
                index,
                self.values.len()
            ))
        })
    }

    /// Position of `value` in the domain, if it is a member.
    ///
    /// Domains are small in practice, so this is a linear scan; no hashing
    /// of real values is required.
    pub fn index_of(&self, value: &DomainValue) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }

    /// All values, in domain order.
    pub fn values(&self) -> &[DomainValue] {
        &self.values
    }
}
