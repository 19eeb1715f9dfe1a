//! N-rule successor map: `f_N(v)` = v's N-th outgoing link, or HALT when
//! out-degree < N.

use basin_common::NodeId;
use basin_snapshot::CsrGraph;

/// Flat successor array for a fixed N. HALT is stored as the reserved code
/// `V` so the array stays u32 and branch-free to index.
pub struct SuccessorMap {
    n: u32,
    succ: Vec<u32>,
}

impl SuccessorMap {
    /// Derive `f_N` in a single pass over the CSR offsets.
    /// Deterministic and idempotent for a given snapshot.
    pub fn build(graph: &CsrGraph, n: u32) -> Self {
        assert!(n >= 1, "N-link rule requires N >= 1");
        let v = graph.num_nodes();
        let halt = v;
        let mut succ = Vec::with_capacity(v as usize);
        for node in 0..v {
            succ.push(match graph.nth_link(NodeId(node), n) {
                Some(t) => t.0,
                None => halt,
            });
        }
        Self { n, succ }
    }

    #[inline]
    pub fn n(&self) -> u32 {
        self.n
    }

    #[inline]
    pub fn num_nodes(&self) -> u32 {
        self.succ.len() as u32
    }

    /// The reserved HALT code (= V).
    #[inline]
    pub fn halt_code(&self) -> u32 {
        self.succ.len() as u32
    }

    #[inline]
    pub fn successor(&self, v: NodeId) -> Option<NodeId> {
        let s = self.succ[v.index()];
        if s == self.halt_code() {
            None
        } else {
            Some(NodeId(s))
        }
    }

    /// Raw successor codes; entries equal to [`Self::halt_code`] mean HALT.
    #[inline]
    pub fn raw(&self) -> &[u32] {
        &self.succ
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn five_node_graph() -> CsrGraph {
        // 0 -> [1, 2], 1 -> [0, 3], 2 -> [3], 3 -> [3, 4], 4 -> [0]
        CsrGraph::from_adjacency(&[
            vec![1, 2],
            vec![0, 3],
            vec![3],
            vec![3, 4],
            vec![0],
        ])
    }

    #[test]
    fn n2_successors() {
        let succ = SuccessorMap::build(&five_node_graph(), 2);
        assert_eq!(succ.successor(NodeId(0)), Some(NodeId(2)));
        assert_eq!(succ.successor(NodeId(1)), Some(NodeId(3)));
        assert_eq!(succ.successor(NodeId(2)), None);
        assert_eq!(succ.successor(NodeId(3)), Some(NodeId(4)));
        assert_eq!(succ.successor(NodeId(4)), None);
    }

    #[test]
    fn n1_successors() {
        let succ = SuccessorMap::build(&five_node_graph(), 1);
        assert_eq!(succ.successor(NodeId(0)), Some(NodeId(1)));
        assert_eq!(succ.successor(NodeId(1)), Some(NodeId(0)));
        assert_eq!(succ.successor(NodeId(2)), Some(NodeId(3)));
        assert_eq!(succ.successor(NodeId(3)), Some(NodeId(3)));
        assert_eq!(succ.successor(NodeId(4)), Some(NodeId(0)));
    }

    #[test]
    fn out_degree_boundary() {
        // Out-degree exactly N-1 halts; exactly N has one successor.
        let g = CsrGraph::from_adjacency(&[vec![1, 1], vec![0, 0, 0]]);
        let succ = SuccessorMap::build(&g, 3);
        assert_eq!(succ.successor(NodeId(0)), None);
        assert_eq!(succ.successor(NodeId(1)), Some(NodeId(0)));
    }

    #[test]
    fn halt_code_is_v() {
        let succ = SuccessorMap::build(&five_node_graph(), 2);
        assert_eq!(succ.halt_code(), 5);
        assert_eq!(succ.raw()[2], 5);
    }

    #[test]
    fn matches_csr_slot() {
        let g = five_node_graph();
        for n in 1..4u32 {
            let succ = SuccessorMap::build(&g, n);
            for v in 0..g.num_nodes() {
                let expected = g.links(NodeId(v)).get(n as usize - 1).copied();
                assert_eq!(succ.successor(NodeId(v)).map(|s| s.0), expected);
            }
        }
    }
}
