//! Edge message access for factor updates.
//!
//! The update layer reads inbound messages and publishes outbound messages
//! through the [`FactorEdges`] trait, so the graph model's edge storage stays
//! outside this crate. [`EdgeBuffers`] is a concrete provider for tests and
//! standalone embedding.

use crate::errors::FactorError;

/// Per-factor view of sibling edge messages.
///
/// Port `p` corresponds to dimension `p` of the factor's table. Each port
/// carries one inbound message (variable to factor) and one outbound slot
/// (factor to variable), both of the port's domain cardinality.
pub trait FactorEdges {
    /// Number of sibling edges.
    fn num_edges(&self) -> usize;

    /// Current inbound message on `port`.
    fn in_msg(&self, port: usize) -> &[f64];

    /// Last published outbound message on `port`.
    fn out_msg(&self, port: usize) -> &[f64];

    /// Outbound message slot on `port`.
    fn out_msg_mut(&mut self, port: usize) -> &mut [f64];

    /// Damping factor `λ ∈ [0, 1)` for `port`; zero means undamped.
    fn damping(&self, port: usize) -> f64;

    /// Whether any port has a nonzero damping factor. When false the update
    /// skips reading previous messages entirely.
    fn is_damping_in_use(&self) -> bool;
}

/// Owned message buffers implementing [`FactorEdges`].
///
/// Messages are initialized uniform (`1/size` per value).
#[derive(Debug, Clone)]
pub struct EdgeBuffers {
    in_msgs: Vec<Vec<f64>>,
    out_msgs: Vec<Vec<f64>>,
    damping: Vec<f64>,
}

impl EdgeBuffers {
    /// Creates buffers for edges with the given per-port cardinalities and a
    /// single damping factor applied to every port.
    pub fn new(sizes: &[usize], damping: f64) -> Result<Self, FactorError> {
        if !(0.0..1.0).contains(&damping) {
            return Err(FactorError::Validation(
                "damping must be in [0, 1)".into(),
            ));
        }
        let uniform = |n: usize| vec![1.0 / n as f64; n];
        if sizes.iter().any(|&n| n == 0) {
            return Err(FactorError::Validation(
                "edge message size must be nonzero".into(),
            ));
        }
        Ok(Self {
            in_msgs: sizes.iter().map(|&n| uniform(n)).collect(),
            out_msgs: sizes.iter().map(|&n| uniform(n)).collect(),
            damping: vec![damping; sizes.len()],
        })
    }

    /// Replaces the inbound message on `port`.
    pub fn set_in_msg(&mut self, port: usize, msg: Vec<f64>) -> Result<(), FactorError> {
        let slot = self.in_msgs.get_mut(port).ok_or_else(|| {
            FactorError::Domain(format!("port {} out of range", port))
        })?;
        if msg.len() != slot.len() {
            return Err(FactorError::DimensionMismatch {
                expected: slot.len(),
                actual: msg.len(),
            });
        }
        *slot = msg;
        Ok(())
    }

    /// Sets the damping factor on `port`.
    pub fn set_damping(&mut self, port: usize, damping: f64) -> Result<(), FactorError> {
        if !(0.0..1.0).contains(&damping) {
            return Err(FactorError::Validation(
                "damping must be in [0, 1)".into(),
            ));
        }
        let slot = self.damping.get_mut(port).ok_or_else(|| {
            FactorError::Domain(format!("port {} out of range", port))
        })?;
        *slot = damping;
        Ok(())
    }
}

impl FactorEdges for EdgeBuffers {
    fn num_edges(&self) -> usize {
        self.in_msgs.len()
    }

    fn in_msg(&self, port: usize) -> &[f64] {
        &self.in_msgs[port]
    }

    fn out_msg(&self, port: usize) -> &[f64] {
        &self.out_msgs[port]
    }

    fn out_msg_mut(&mut self, port: usize) -> &mut [f64] {
        &mut self.out_msgs[port]
    }

    fn damping(&self, port: usize) -> f64 {
        self.damping[port]
    }

    fn is_damping_in_use(&self) -> bool {
        self.damping.iter().any(|&d| d != 0.0)
    }
}
