//! Basin materialization: reverse reachability from a cycle.
//!
//! Frontier-based reverse BFS over the reverse CSR. The next level is exactly
//! `{u : f_N(u) ∈ frontier} ∖ visited`, so each node surfaces at its minimal
//! depth. Levels are sorted before they are appended, which makes the member
//! list deterministic regardless of predecessor layout.

use basin_common::{BasinError, BasinResult, CancelFlag, CycleId};

use crate::bitset::BitSet;
use crate::cycles::Classification;
use crate::reverse::ReverseCsr;

/// Knobs for one materialization.
#[derive(Clone, Debug, Default)]
pub struct BasinOptions {
    /// Soft cap on member count. When hit the basin is truncated, flagged,
    /// and a warning is logged; it is not an error.
    pub node_budget: Option<u64>,
    /// Record the BFS parent (= `f_N(v)`) for every member, for
    /// visualization. Cycle members record themselves.
    pub record_parents: bool,
}

/// A materialized basin: every node whose trajectory resolves to the cycle,
/// stratified by depth.
#[derive(Debug)]
pub struct Basin {
    pub cycle_id: CycleId,
    /// `(node, depth)` sorted by depth, then node id.
    pub members: Vec<(u32, u32)>,
    /// Parent per member, aligned with `members`. Present only when requested.
    pub parents: Option<Vec<u32>>,
    /// `layers[d]` = number of members at depth d.
    pub layers: Vec<u64>,
    pub truncated: bool,
}

impl Basin {
    pub fn size(&self) -> u64 {
        self.members.len() as u64
    }

    pub fn max_depth(&self) -> u32 {
        (self.layers.len() - 1) as u32
    }
}

/// Enumerate the basin of `cycle_id` level by level.
///
/// Memory: one V-bit visited set plus the member list. Cancellation is
/// polled between levels.
pub fn materialize_basin(
    rev: &ReverseCsr,
    class: &Classification,
    cycle_id: CycleId,
    opts: &BasinOptions,
    cancel: &CancelFlag,
) -> BasinResult<Basin> {
    let cycle = class
        .cycles()
        .get(cycle_id)
        .ok_or(BasinError::CycleNotFound {
            n: class.n(),
            cycle_id: cycle_id.0 as i64,
        })?;

    let mut visited = BitSet::new(class.num_nodes() as u64);
    let mut members: Vec<(u32, u32)> = Vec::new();
    let mut parents: Vec<u32> = Vec::new();
    let mut layers: Vec<u64> = Vec::new();
    let mut truncated = false;

    // Depth 0: the cycle itself, ascending.
    let mut frontier: Vec<u32> = cycle.members.iter().map(|m| m.0).collect();
    frontier.sort_unstable();
    for &m in &frontier {
        visited.set(m as u64);
        members.push((m, 0));
        if opts.record_parents {
            parents.push(m);
        }
    }
    layers.push(frontier.len() as u64);

    let mut depth = 0u32;
    while !frontier.is_empty() && !truncated {
        cancel.check()?;
        depth += 1;

        let mut level: Vec<(u32, u32)> = Vec::new();
        for &v in &frontier {
            for &u in rev.predecessors(basin_common::NodeId(v)) {
                if !visited.get(u as u64) {
                    visited.set(u as u64);
                    level.push((u, v));
                }
            }
        }
        if level.is_empty() {
            break;
        }
        level.sort_unstable_by_key(|&(u, _)| u);

        if let Some(budget) = opts.node_budget {
            let room = budget.saturating_sub(members.len() as u64) as usize;
            if level.len() > room {
                tracing::warn!(
                    cycle = %cycle_id,
                    depth,
                    budget,
                    dropped = level.len() - room,
                    "basin node budget reached; truncating"
                );
                level.truncate(room);
                truncated = true;
            }
        }
        if level.is_empty() {
            break;
        }

        for &(u, parent) in &level {
            members.push((u, depth));
            if opts.record_parents {
                parents.push(parent);
            }
        }
        layers.push(level.len() as u64);
        frontier = level.into_iter().map(|(u, _)| u).collect();
    }

    Ok(Basin {
        cycle_id,
        members,
        parents: opts.record_parents.then_some(parents),
        layers,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycles::classify;
    use crate::successor::SuccessorMap;
    use basin_snapshot::CsrGraph;

    fn five_node_graph() -> CsrGraph {
        CsrGraph::from_adjacency(&[
            vec![1, 2],
            vec![0, 3],
            vec![3],
            vec![3, 4],
            vec![0],
        ])
    }

    fn setup(graph: &CsrGraph, n: u32) -> (ReverseCsr, Classification) {
        let succ = SuccessorMap::build(graph, n);
        let class = classify(&succ, &CancelFlag::new()).unwrap();
        let rev = ReverseCsr::build(&succ);
        (rev, class)
    }

    #[test]
    fn five_node_basins_at_n1() {
        let g = five_node_graph();
        let (rev, class) = setup(&g, 1);

        let b0 = materialize_basin(
            &rev,
            &class,
            CycleId(0),
            &BasinOptions::default(),
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(b0.members, vec![(0, 0), (1, 0), (4, 1)]);
        assert_eq!(b0.layers, vec![2, 1]);
        assert!(!b0.truncated);
        assert_eq!(b0.size(), 3);

        let b3 = materialize_basin(
            &rev,
            &class,
            CycleId(3),
            &BasinOptions::default(),
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(b3.members, vec![(3, 0), (2, 1)]);
        assert_eq!(b3.layers, vec![1, 1]);
    }

    #[test]
    fn unknown_cycle_rejected() {
        let g = five_node_graph();
        let (rev, class) = setup(&g, 1);
        let err = materialize_basin(
            &rev,
            &class,
            CycleId(2),
            &BasinOptions::default(),
            &CancelFlag::new(),
        )
        .unwrap_err();
        assert!(matches!(err, BasinError::CycleNotFound { n: 1, cycle_id: 2 }));
    }

    #[test]
    fn star_basin() {
        // 1000 leaves all pointing at node 0, which loops on itself.
        let mut adj = vec![vec![0u32]];
        for _ in 0..1000 {
            adj.push(vec![0]);
        }
        let g = CsrGraph::from_adjacency(&adj);
        let (rev, class) = setup(&g, 1);
        let b = materialize_basin(
            &rev,
            &class,
            CycleId(0),
            &BasinOptions::default(),
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(b.size(), 1001);
        assert_eq!(b.layers, vec![1, 1000]);
    }

    #[test]
    fn budget_truncates_with_flag() {
        let mut adj = vec![vec![0u32]];
        for _ in 0..100 {
            adj.push(vec![0]);
        }
        let g = CsrGraph::from_adjacency(&adj);
        let (rev, class) = setup(&g, 1);
        let b = materialize_basin(
            &rev,
            &class,
            CycleId(0),
            &BasinOptions {
                node_budget: Some(11),
                record_parents: false,
            },
            &CancelFlag::new(),
        )
        .unwrap();
        assert!(b.truncated);
        assert_eq!(b.size(), 11);
        // Deterministic truncation keeps the lowest node ids.
        assert_eq!(b.members.last().unwrap().0, 10);
    }

    #[test]
    fn parents_follow_successor() {
        let g = five_node_graph();
        let (rev, class) = setup(&g, 1);
        let b = materialize_basin(
            &rev,
            &class,
            CycleId(0),
            &BasinOptions {
                node_budget: None,
                record_parents: true,
            },
            &CancelFlag::new(),
        )
        .unwrap();
        let parents = b.parents.unwrap();
        // Members: (0,0), (1,0), (4,1). Node 4's parent is its successor 0.
        assert_eq!(parents, vec![0, 1, 0]);
    }

    #[test]
    fn basin_size_equals_layer_sum() {
        let g = five_node_graph();
        let (rev, class) = setup(&g, 1);
        for cycle in class.cycles().iter() {
            let b = materialize_basin(
                &rev,
                &class,
                cycle.id,
                &BasinOptions::default(),
                &CancelFlag::new(),
            )
            .unwrap();
            assert_eq!(b.size(), b.layers.iter().sum::<u64>());
        }
    }

    #[test]
    fn depths_match_classification() {
        let g = CsrGraph::from_adjacency(&[vec![0], vec![0], vec![1], vec![2], vec![2]]);
        let (rev, class) = setup(&g, 1);
        let b = materialize_basin(
            &rev,
            &class,
            CycleId(0),
            &BasinOptions::default(),
            &CancelFlag::new(),
        )
        .unwrap();
        for &(node, depth) in &b.members {
            assert_eq!(class.depth_of(basin_common::NodeId(node)), Some(depth));
        }
    }
}
