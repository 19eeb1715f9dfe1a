//! Compressed Sparse Row storage for the ordered outgoing-link lists.
//!
//! `offsets[v]..offsets[v+1]` delimits node v's targets in prose order.
//! Targets are u32 (valid while V < 2^32); duplicates within a node are
//! preserved, so "the N-th link" always means the N-th slot.

use basin_common::{BasinError, BasinResult, NodeId};

/// Immutable CSR over the link graph.
#[derive(Debug)]
pub struct CsrGraph {
    offsets: Vec<u64>,
    targets: Vec<u32>,
}

impl CsrGraph {
    /// Assemble a CSR from prebuilt arrays, validating structural invariants:
    /// offsets monotone, first 0, last equal to `targets.len()`, and every
    /// target a valid node id.
    pub fn from_parts(offsets: Vec<u64>, targets: Vec<u32>) -> BasinResult<Self> {
        if offsets.is_empty() {
            return Err(BasinError::BadSnapshot("empty offsets array".into()));
        }
        if offsets[0] != 0 {
            return Err(BasinError::BadSnapshot("offsets must start at 0".into()));
        }
        if *offsets.last().unwrap() != targets.len() as u64 {
            return Err(BasinError::BadSnapshot(format!(
                "last offset {} does not match target count {}",
                offsets.last().unwrap(),
                targets.len()
            )));
        }
        if offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(BasinError::BadSnapshot("offsets not monotone".into()));
        }
        let num_nodes = (offsets.len() - 1) as u64;
        if let Some(&bad) = targets.iter().find(|&&t| t as u64 >= num_nodes) {
            return Err(BasinError::BadSnapshot(format!(
                "target {bad} out of range for {num_nodes} nodes"
            )));
        }
        Ok(Self { offsets, targets })
    }

    /// Build a CSR from explicit adjacency lists. Test and small-graph helper;
    /// the loader builds large snapshots with count-then-scatter instead.
    pub fn from_adjacency(adjacency: &[Vec<u32>]) -> Self {
        let mut offsets = Vec::with_capacity(adjacency.len() + 1);
        offsets.push(0u64);
        let mut targets = Vec::new();
        for links in adjacency {
            targets.extend_from_slice(links);
            offsets.push(targets.len() as u64);
        }
        Self { offsets, targets }
    }

    #[inline]
    pub fn num_nodes(&self) -> u32 {
        (self.offsets.len() - 1) as u32
    }

    #[inline]
    pub fn num_edges(&self) -> u64 {
        self.targets.len() as u64
    }

    #[inline]
    pub fn out_degree(&self, v: NodeId) -> usize {
        (self.offsets[v.index() + 1] - self.offsets[v.index()]) as usize
    }

    /// The ordered target slice for node v.
    #[inline]
    pub fn links(&self, v: NodeId) -> &[u32] {
        &self.targets[self.offsets[v.index()] as usize..self.offsets[v.index() + 1] as usize]
    }

    /// The target at 1-based position `n`, or `None` when out-degree < n.
    #[inline]
    pub fn nth_link(&self, v: NodeId, n: u32) -> Option<NodeId> {
        let start = self.offsets[v.index()];
        let end = self.offsets[v.index() + 1];
        if end - start >= n as u64 {
            Some(NodeId(self.targets[(start + n as u64 - 1) as usize]))
        } else {
            None
        }
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn targets(&self) -> &[u32] {
        &self.targets
    }

    /// Approximate resident size in bytes: 4·E targets + 8·(V+1) offsets.
    pub fn memory_footprint(&self) -> u64 {
        4 * self.targets.len() as u64 + 8 * self.offsets.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CsrGraph {
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
    fn basic_shape() {
        let g = sample();
        assert_eq!(g.num_nodes(), 5);
        assert_eq!(g.num_edges(), 8);
        assert_eq!(g.out_degree(NodeId(0)), 2);
        assert_eq!(g.out_degree(NodeId(2)), 1);
        assert_eq!(g.links(NodeId(3)), &[3, 4]);
    }

    #[test]
    fn nth_link_is_one_based() {
        let g = sample();
        assert_eq!(g.nth_link(NodeId(0), 1), Some(NodeId(1)));
        assert_eq!(g.nth_link(NodeId(0), 2), Some(NodeId(2)));
        assert_eq!(g.nth_link(NodeId(0), 3), None);
        assert_eq!(g.nth_link(NodeId(2), 1), Some(NodeId(3)));
        assert_eq!(g.nth_link(NodeId(2), 2), None);
    }

    #[test]
    fn duplicate_targets_preserved() {
        let g = CsrGraph::from_adjacency(&[vec![1, 1, 1], vec![]]);
        assert_eq!(g.links(NodeId(0)), &[1, 1, 1]);
        assert_eq!(g.nth_link(NodeId(0), 3), Some(NodeId(1)));
    }

    #[test]
    fn empty_node() {
        let g = CsrGraph::from_adjacency(&[vec![], vec![0]]);
        assert_eq!(g.out_degree(NodeId(0)), 0);
        assert!(g.links(NodeId(0)).is_empty());
        assert_eq!(g.nth_link(NodeId(0), 1), None);
    }

    #[test]
    fn from_parts_valid() {
        let g = CsrGraph::from_parts(vec![0, 2, 3], vec![1, 1, 0]).unwrap();
        assert_eq!(g.num_nodes(), 2);
        assert_eq!(g.links(NodeId(0)), &[1, 1]);
    }

    #[test]
    fn from_parts_rejects_bad_offsets() {
        assert!(CsrGraph::from_parts(vec![], vec![]).is_err());
        assert!(CsrGraph::from_parts(vec![1, 2], vec![0]).is_err());
        assert!(CsrGraph::from_parts(vec![0, 2, 1], vec![0, 0]).is_err());
        assert!(CsrGraph::from_parts(vec![0, 1], vec![0, 0]).is_err());
    }

    #[test]
    fn from_parts_rejects_dangling_target() {
        let err = CsrGraph::from_parts(vec![0, 1], vec![5]).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn memory_footprint_formula() {
        let g = sample();
        assert_eq!(g.memory_footprint(), 4 * 8 + 8 * 6);
    }
}
