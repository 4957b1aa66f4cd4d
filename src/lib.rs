//! # factab
//!
//! Optimized table-factor updates for discrete factor graphs.
//!
//! Given a discrete factor's potential table and the current inbound
//! messages on its edges, this crate computes all outbound sum-product
//! messages efficiently: sparse tables are iterated by their nonzero entries
//! with precomputed index maps, and a shared-intermediate update plan
//! amortizes marginalization work across ports. The outer solver loop, graph
//! model, and variable updates live outside this crate and talk to it
//! through [`FactorEdges`](engine::edges::FactorEdges) and
//! [`FactorTable`](table::FactorTable).
//!
//! ## Example
//!
//! ```
//! use factab::{DiscreteDomain, FactorTable, TableWrapper, UpdateConfig};
//! use factab::engine::edges::{EdgeBuffers, FactorEdges};
//!
//! let domains = vec![
//!     DiscreteDomain::range(2).unwrap(),
//!     DiscreteDomain::range(2).unwrap(),
//! ];
//! let table = FactorTable::from_dense_weights(domains, vec![2.0, 1.0, 1.0, 2.0]).unwrap();
//! let mut edges = EdgeBuffers::new(&[2, 2], 0.0).unwrap();
//!
//! let mut wrapper = TableWrapper::new(UpdateConfig::default()).unwrap();
//! wrapper.initialize(&table).unwrap();
//! wrapper.update(&table, &mut edges).unwrap();
//! assert_eq!(edges.out_msg(1), &[0.5, 0.5]);
//! ```

pub mod domain;
pub mod engine;
pub mod errors;
pub mod indexer;
pub mod table;

pub use domain::{DiscreteDomain, DomainValue};
pub use engine::edges::{EdgeBuffers, FactorEdges};
pub use engine::parallel::{update_round, FactorRuntime};
pub use engine::selector::{StrategyKind, UpdateApproach, UpdateConfig};
pub use engine::wrapper::{TableWrapper, UpdateDiagnostics, WrapperState};
pub use errors::FactorError;
pub use indexer::JointIndexer;
pub use table::{FactorTable, TableRepresentation};
