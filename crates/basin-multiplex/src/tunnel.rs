//! Tunnel nodes: pages whose cycle identity changes as N varies.

use crate::assignment::MultiplexTable;

/// How a tunnel node's assignment moves as N increases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TunnelKind {
    /// The cycle assignment changes at most once over ascending N.
    Progressive,
    /// The assignment flips more than once.
    Alternating,
}

impl TunnelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Progressive => "progressive",
            Self::Alternating => "alternating",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TunnelNode {
    pub node: u32,
    pub n_distinct_cycles: u32,
    pub transitions: u32,
    /// Mean depth over the cycle-resolving layers.
    pub mean_depth: f64,
    pub score: f64,
    pub kind: TunnelKind,
}

/// Scan the multiplex for tunnel nodes.
///
/// Only cycle-resolving layers participate: a HALT layer neither contributes
/// a cycle identity nor counts as a transition. Nodes need ≥2 distinct cycle
/// identities to qualify. Importance score:
/// `n_distinct × ln(1 + transitions) × (C / max(mean_depth, 1))`.
/// Output is ordered by descending score, ties by ascending node id.
pub fn find_tunnels(table: &MultiplexTable, score_constant: f64) -> Vec<TunnelNode> {
    let mut tunnels = Vec::new();
    let num_nodes = table.num_nodes();

    let mut assigned: Vec<u32> = Vec::with_capacity(table.layers().len());
    for v in 0..num_nodes {
        assigned.clear();
        let mut depth_sum = 0u64;
        for layer in table.layers() {
            if let Some(cycle) = layer.terminal(v) {
                assigned.push(cycle);
                depth_sum += layer.depth(v).unwrap_or(0) as u64;
            }
        }
        if assigned.len() < 2 {
            continue;
        }

        let mut distinct: Vec<u32> = assigned.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() < 2 {
            continue;
        }

        let transitions = assigned.windows(2).filter(|w| w[0] != w[1]).count() as u32;
        let mean_depth = depth_sum as f64 / assigned.len() as f64;
        let score = distinct.len() as f64
            * (1.0 + transitions as f64).ln()
            * (score_constant / mean_depth.max(1.0));

        tunnels.push(TunnelNode {
            node: v,
            n_distinct_cycles: distinct.len() as u32,
            transitions,
            mean_depth,
            score,
            kind: if transitions <= 1 {
                TunnelKind::Progressive
            } else {
                TunnelKind::Alternating
            },
        });
    }

    tunnels.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.node.cmp(&b.node))
    });
    tunnels
}
