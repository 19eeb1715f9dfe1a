//! Reverse CSR of the successor map: predecessors under `f_N`.
//!
//! The reverse side is the expensive one — variable in-degree — so it is
//! built once per N with a linear count-then-scatter and shared across all
//! basin work at that N. Predecessor lists come out in ascending node order
//! because the scatter walks nodes in order.

use basin_common::NodeId;

use crate::successor::SuccessorMap;

pub struct ReverseCsr {
    offsets: Vec<u64>,
    preds: Vec<u32>,
}

impl ReverseCsr {
    pub fn build(succ: &SuccessorMap) -> Self {
        let v = succ.num_nodes() as usize;
        let halt = succ.halt_code();
        let raw = succ.raw();

        let mut counts = vec![0u32; v];
        for &s in raw {
            if s != halt {
                counts[s as usize] += 1;
            }
        }

        let mut offsets = Vec::with_capacity(v + 1);
        let mut total = 0u64;
        offsets.push(0u64);
        for &c in &counts {
            total += c as u64;
            offsets.push(total);
        }

        let mut preds = vec![0u32; total as usize];
        let mut cursor: Vec<u64> = offsets[..v].to_vec();
        for (u, &s) in raw.iter().enumerate() {
            if s != halt {
                preds[cursor[s as usize] as usize] = u as u32;
                cursor[s as usize] += 1;
            }
        }

        Self { offsets, preds }
    }

    #[inline]
    pub fn num_nodes(&self) -> u32 {
        (self.offsets.len() - 1) as u32
    }

    #[inline]
    pub fn num_edges(&self) -> u64 {
        self.preds.len() as u64
    }

    /// Nodes u with `f_N(u) = v`, ascending.
    #[inline]
    pub fn predecessors(&self, v: NodeId) -> &[u32] {
        &self.preds[self.offsets[v.index()] as usize..self.offsets[v.index() + 1] as usize]
    }

    pub fn memory_footprint(&self) -> u64 {
        4 * self.preds.len() as u64 + 8 * self.offsets.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basin_snapshot::CsrGraph;

    #[test]
    fn reverse_of_five_node_graph_at_n1() {
        // succ = {0->1, 1->0, 2->3, 3->3, 4->0}.
        let g = CsrGraph::from_adjacency(&[
            vec![1, 2],
            vec![0, 3],
            vec![3],
            vec![3, 4],
            vec![0],
        ]);
        let succ = SuccessorMap::build(&g, 1);
        let rev = ReverseCsr::build(&succ);

        assert_eq!(rev.num_nodes(), 5);
        assert_eq!(rev.num_edges(), 5);
        assert_eq!(rev.predecessors(NodeId(0)), &[1, 4]);
        assert_eq!(rev.predecessors(NodeId(1)), &[0]);
        assert_eq!(rev.predecessors(NodeId(2)), &[] as &[u32]);
        assert_eq!(rev.predecessors(NodeId(3)), &[2, 3]);
        assert_eq!(rev.predecessors(NodeId(4)), &[] as &[u32]);
    }

    #[test]
    fn halt_edges_are_absent() {
        // succ at N=2 = {0->2, 1->3, 2->HALT, 3->4, 4->HALT}.
        let g = CsrGraph::from_adjacency(&[
            vec![1, 2],
            vec![0, 3],
            vec![3],
            vec![3, 4],
            vec![0],
        ]);
        let succ = SuccessorMap::build(&g, 2);
        let rev = ReverseCsr::build(&succ);
        assert_eq!(rev.num_edges(), 3);
        assert_eq!(rev.predecessors(NodeId(2)), &[0]);
        assert_eq!(rev.predecessors(NodeId(4)), &[3]);
    }

    #[test]
    fn predecessors_ascending() {
        // Star: everything points at node 0.
        let g = CsrGraph::from_adjacency(&[vec![0], vec![0], vec![0], vec![0]]);
        let succ = SuccessorMap::build(&g, 1);
        let rev = ReverseCsr::build(&succ);
        assert_eq!(rev.predecessors(NodeId(0)), &[0, 1, 2, 3]);
    }
}
