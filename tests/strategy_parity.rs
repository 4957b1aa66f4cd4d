//! Tests verifying that every strategy and approach computes the same
//! outbound messages for the same logical factor.
//!
//! Dense vs sparse step encodings, and the normal vs optimized approaches,
//! are interchangeable up to floating tolerance; these tests pin that down
//! on deterministic pseudo-random tables.

use std::sync::Arc;

use factab::{
    DiscreteDomain, EdgeBuffers, FactorEdges, FactorTable, StrategyKind, TableRepresentation,
    TableWrapper, UpdateApproach, UpdateConfig,
};

/// Small deterministic generator so failures reproduce exactly.
struct XorShift(u64);

impl XorShift {
    fn next_f64(&mut self) -> f64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn domains(sizes: &[usize]) -> Vec<DiscreteDomain> {
    sizes
        .iter()
        .map(|&n| DiscreteDomain::range(n).unwrap())
        .collect()
}

/// A sparse table where roughly `keep` of the joint range is nonzero, plus
/// inbound messages, all pseudo-random.
fn random_case(
    sizes: &[usize],
    keep: f64,
    seed: u64,
) -> (FactorTable, EdgeBuffers) {
    let mut rng = XorShift(seed);
    let joint: usize = sizes.iter().product();
    let mut tuples: Vec<Vec<usize>> = Vec::new();
    let mut weights = Vec::new();
    let ix = factab::JointIndexer::new(domains(sizes)).unwrap();
    let mut idx = vec![0usize; sizes.len()];
    for j in 0..joint {
        ix.indices_from_joint(j, &mut idx).unwrap();
        if rng.next_f64() < keep {
            tuples.push(idx.clone());
            weights.push(rng.next_f64() + 0.1);
        }
    }
    // Guarantee at least one entry so normalization stays meaningful.
    if tuples.is_empty() {
        tuples.push(vec![0; sizes.len()]);
        weights.push(1.0);
    }
    let refs: Vec<&[usize]> = tuples.iter().map(|t| t.as_slice()).collect();
    let table = FactorTable::from_sparse(domains(sizes), &refs, &weights).unwrap();

    let mut edges = EdgeBuffers::new(sizes, 0.0).unwrap();
    for (port, &n) in sizes.iter().enumerate() {
        let msg: Vec<f64> = (0..n).map(|_| rng.next_f64() + 0.05).collect();
        edges.set_in_msg(port, msg).unwrap();
    }
    (table, edges)
}

fn run(table: &FactorTable, edges: &EdgeBuffers, config: UpdateConfig) -> Vec<Vec<f64>> {
    let mut edges = edges.clone();
    let mut wrapper = TableWrapper::new(config).unwrap();
    wrapper.initialize(table).unwrap();
    wrapper.update(table, &mut edges).unwrap();
    (0..edges.num_edges())
        .map(|p| edges.out_msg(p).to_vec())
        .collect()
}

fn assert_all_close(a: &[Vec<f64>], b: &[Vec<f64>]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        for (u, v) in x.iter().zip(y) {
            assert!((u - v).abs() < 1e-9, "{:?} != {:?}", x, y);
        }
    }
}

#[test]
fn sparse_and_dense_strategies_agree() {
    for (seed, sizes) in [
        (1u64, vec![2usize, 3, 4]),
        (7, vec![3, 3]),
        (13, vec![2, 2, 2, 2]),
        (29, vec![5, 4, 3]),
    ] {
        let (sparse_table, edges) = random_case(&sizes, 0.4, seed);
        let mut dense_table = sparse_table.clone();
        dense_table
            .set_representation(TableRepresentation::Dense)
            .unwrap();

        for approach in [UpdateApproach::Normal, UpdateApproach::Optimized] {
            let config = UpdateConfig {
                approach,
                ..UpdateConfig::default()
            };
            let from_sparse = run(&sparse_table, &edges, config);
            let from_dense = run(&dense_table, &edges, config);
            assert_all_close(&from_sparse, &from_dense);
        }
    }
}

#[test]
fn normal_and_optimized_approaches_agree() {
    for (seed, sizes) in [
        (3u64, vec![2usize, 3, 4]),
        (17, vec![4, 4, 4]),
        (23, vec![2, 2, 3, 3]),
        (41, vec![6]),
    ] {
        let (table, edges) = random_case(&sizes, 0.5, seed);
        let normal = run(
            &table,
            &edges,
            UpdateConfig {
                approach: UpdateApproach::Normal,
                ..UpdateConfig::default()
            },
        );
        let optimized = run(
            &table,
            &edges,
            UpdateConfig {
                approach: UpdateApproach::Optimized,
                ..UpdateConfig::default()
            },
        );
        assert_all_close(&normal, &optimized);
    }
}

#[test]
fn chosen_strategy_tracks_representation() {
    let (sparse_table, _) = random_case(&[2, 3, 4], 0.3, 5);
    let mut wrapper = TableWrapper::new(UpdateConfig::default()).unwrap();
    wrapper.initialize(&sparse_table).unwrap();
    assert_eq!(wrapper.strategy(), Some(StrategyKind::Sparse));

    let mut dense_table = sparse_table.clone();
    dense_table
        .set_representation(TableRepresentation::Dense)
        .unwrap();
    let mut wrapper = TableWrapper::new(UpdateConfig::default()).unwrap();
    wrapper.initialize(&dense_table).unwrap();
    assert_eq!(wrapper.strategy(), Some(StrategyKind::Dense));
}

#[test]
fn shared_table_parallel_round_matches_sequential() {
    let (table, edges) = random_case(&[3, 3, 3], 0.6, 11);
    let table = Arc::new(table);
    let config = UpdateConfig::default();

    let mut runtimes: Vec<factab::FactorRuntime> = (0..4)
        .map(|_| factab::FactorRuntime::new(Arc::clone(&table), config).unwrap())
        .collect();
    for rt in runtimes.iter_mut() {
        for port in 0..3 {
            rt.edges_mut()
                .set_in_msg(port, edges.in_msg(port).to_vec())
                .unwrap();
        }
    }
    factab::update_round(&mut runtimes).unwrap();

    let reference = run(&table, &edges, config);
    for rt in &runtimes {
        let got: Vec<Vec<f64>> = (0..3).map(|p| rt.edges().out_msg(p).to_vec()).collect();
        assert_all_close(&got, &reference);
    }
}
