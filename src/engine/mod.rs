//! The table-factor update engine.
//!
//! Data flows from the edge messages ([`edges`]) through the chosen update
//! steps ([`steps`]) over a [`FactorTable`](crate::table::FactorTable),
//! coordinated per factor by a [`wrapper::TableWrapper`]; [`selector`] picks
//! the sparse or dense encoding and the update approach at derivation time.

pub mod edges;
pub mod parallel;
pub mod selector;
pub mod steps;
pub mod wrapper;
