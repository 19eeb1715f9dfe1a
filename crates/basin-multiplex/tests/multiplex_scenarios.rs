//! Cross-N smoke scenarios from small literal graphs.

use basin_common::CancelFlag;
use basin_multiplex::{
    basin_flows, find_tunnels, hyperstructure_coverage, layer_connectivity, stability_scores,
    MultiplexTable, TunnelKind,
};
use basin_snapshot::CsrGraph;

/// 0 -> [1, 2], 1 -> [0, 3], 2 -> [3], 3 -> [3, 4], 4 -> [0]
fn five_node_graph() -> CsrGraph {
    CsrGraph::from_adjacency(&[
        vec![1, 2],
        vec![0, 3],
        vec![3],
        vec![3, 4],
        vec![0],
    ])
}

#[test]
fn multiplex_smoke_test() {
    let table = MultiplexTable::build(&five_node_graph(), &[1, 2], &CancelFlag::new()).unwrap();

    // 5 pages x 2 layers = 10 assignment rows.
    let rows: usize = table
        .layers()
        .iter()
        .map(|l| l.num_nodes() as usize)
        .sum();
    assert_eq!(rows, 10);

    // Every (page, layer) cell is either a cycle assignment or HALT.
    for layer in table.layers() {
        for v in 0..layer.num_nodes() {
            match layer.terminal(v) {
                Some(_) => assert!(layer.depth(v).is_some()),
                None => assert!(layer.depth(v).is_none()),
            }
        }
    }

    // All four ordered layer pairs are present in the matrix.
    let matrix = layer_connectivity(&table);
    for (src, dst) in [(1, 1), (1, 2), (2, 1), (2, 2)] {
        assert!(matrix.same_count(src, dst).is_some());
        assert!(matrix.diff_count(src, dst).is_some());
    }
    // Totals: every page resolves at N=1 and halts at N=2.
    assert_eq!(matrix.same_count(1, 1), Some(5));
    assert_eq!(matrix.same_count(1, 2), Some(0));
    assert_eq!(matrix.diff_count(1, 2), Some(0));
    assert_eq!(matrix.same_count(2, 2), Some(0));
}

#[test]
fn alternating_tunnel_scenario() {
    // Nodes a=0 and b=1 sit in distinct length-1 cycles at every N; node 2's
    // out-sequence alternates [a, b, a, b], so its assignment flips at every
    // step of N in {1, 2, 3, 4}.
    let graph = CsrGraph::from_adjacency(&[
        vec![0, 0, 0, 0],
        vec![1, 1, 1, 1],
        vec![0, 1, 0, 1],
    ]);
    let table = MultiplexTable::build(&graph, &[1, 2, 3, 4], &CancelFlag::new()).unwrap();
    let tunnels = find_tunnels(&table, 10.0);

    assert_eq!(tunnels.len(), 1);
    let tunnel = &tunnels[0];
    assert_eq!(tunnel.node, 2);
    assert_eq!(tunnel.n_distinct_cycles, 2);
    assert_eq!(tunnel.transitions, 3);
    assert_eq!(tunnel.kind, TunnelKind::Alternating);
}

#[test]
fn flows_and_stability_agree_with_assignments() {
    let table = MultiplexTable::build(&five_node_graph(), &[1, 2], &CancelFlag::new()).unwrap();

    let flows = basin_flows(&table);
    assert_eq!(flows.iter().map(|f| f.count).sum::<u64>(), 5);

    let scores = stability_scores(&table);
    // Cycles {0,1} and {3} exist only at N=1.
    assert_eq!(scores.len(), 2);
    for score in &scores {
        assert_eq!(score.layers_present, 1);
        assert!((score.persistence - 0.5).abs() < 1e-12);
    }
    assert_eq!(scores.iter().map(|s| s.total_pages).sum::<u64>(), 5);

    let coverage = hyperstructure_coverage(&table);
    assert_eq!(coverage.covered, 5);
}

#[test]
fn single_layer_multiplex_is_degenerate_but_valid() {
    let table = MultiplexTable::build(&five_node_graph(), &[2], &CancelFlag::new()).unwrap();
    assert!(find_tunnels(&table, 10.0).is_empty());
    assert!(basin_flows(&table).is_empty());
    let coverage = hyperstructure_coverage(&table);
    assert_eq!(coverage.covered, 0);
    assert_eq!(coverage.total, 5);
}
