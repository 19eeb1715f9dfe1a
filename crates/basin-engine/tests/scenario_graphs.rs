//! Literal classification scenarios over small graphs, plus the synthetic
//! large-basin star.

use basin_common::{CancelFlag, CycleId, NodeId};
use basin_engine::{
    classify, materialize_basin, BasinOptions, Classification, ReverseCsr, SuccessorMap,
};
use basin_snapshot::CsrGraph;

fn classify_at(graph: &CsrGraph, n: u32) -> Classification {
    let succ = SuccessorMap::build(graph, n);
    classify(&succ, &CancelFlag::new()).unwrap()
}

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
fn five_nodes_all_halt_at_n2() {
    let class = classify_at(&five_node_graph(), 2);
    assert!(class.cycles().is_empty());
    // 0, 1, 3 reach HALT through chains; 2 and 4 halt directly.
    for v in 0..5 {
        assert!(class.is_halt_terminating(NodeId(v)));
    }
}

#[test]
fn five_nodes_two_basins_at_n1() {
    let graph = five_node_graph();
    let class = classify_at(&graph, 1);

    let cycle0 = class.cycles().get(CycleId(0)).unwrap();
    assert_eq!(cycle0.len(), 2);
    let cycle3 = class.cycles().get(CycleId(3)).unwrap();
    assert_eq!(cycle3.len(), 1);

    let succ = SuccessorMap::build(&graph, 1);
    let rev = ReverseCsr::build(&succ);

    let b0 = materialize_basin(
        &rev,
        &class,
        CycleId(0),
        &BasinOptions::default(),
        &CancelFlag::new(),
    )
    .unwrap();
    assert_eq!(b0.members, vec![(0, 0), (1, 0), (4, 1)]);

    let b3 = materialize_basin(
        &rev,
        &class,
        CycleId(3),
        &BasinOptions::default(),
        &CancelFlag::new(),
    )
    .unwrap();
    assert_eq!(b3.members, vec![(3, 0), (2, 1)]);
}

#[test]
fn three_cycle_no_halt() {
    let g = CsrGraph::from_adjacency(&[vec![1], vec![2], vec![0]]);
    let class = classify_at(&g, 1);
    assert_eq!(class.cycles().len(), 1);
    let cycle = class.cycles().get(CycleId(0)).unwrap();
    assert_eq!(cycle.len(), 3);
    for v in 0..3 {
        assert_eq!(class.depth_of(NodeId(v)), Some(0));
        assert!(!class.is_halt_terminating(NodeId(v)));
    }
}

#[test]
fn cycle_of_length_n_under_n_link() {
    // A 3-cycle traversed by the 3-link rule: classification only cares
    // about the functional graph, not about the rule parameter matching the
    // orbit length. Each node's third link closes the orbit.
    let g = CsrGraph::from_adjacency(&[
        vec![0, 0, 1],
        vec![1, 1, 2],
        vec![2, 2, 0],
    ]);
    let class = classify_at(&g, 3);
    let cycle = class.cycles().get(CycleId(0)).unwrap();
    assert_eq!(cycle.len(), 3);
    assert_eq!(cycle.members, vec![NodeId(0), NodeId(1), NodeId(2)]);
}

#[test]
fn million_node_star() {
    // Node 0 points at itself; 999,999 leaves point at node 0.
    const V: u32 = 1_000_000;
    let offsets: Vec<u64> = (0..=V as u64).collect();
    let targets = vec![0u32; V as usize];
    let graph = CsrGraph::from_parts(offsets, targets).unwrap();

    let succ = SuccessorMap::build(&graph, 1);
    let class = classify(&succ, &CancelFlag::new()).unwrap();
    assert_eq!(class.cycles().len(), 1);
    assert_eq!(class.cycles().get(CycleId(0)).unwrap().len(), 1);

    let rev = ReverseCsr::build(&succ);
    let basin = materialize_basin(
        &rev,
        &class,
        CycleId(0),
        &BasinOptions::default(),
        &CancelFlag::new(),
    )
    .unwrap();
    assert_eq!(basin.size(), 1_000_000);
    assert_eq!(basin.layers, vec![1, 999_999]);
    assert!(!basin.truncated);
}
