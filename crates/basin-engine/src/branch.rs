//! Branch decomposition at a cycle-entry node.
//!
//! Restricted to non-cycle nodes, the reverse of `f_N` is a forest: every
//! node has exactly one successor, so distinct predecessors root disjoint
//! subtrees. Subtree sizes therefore accumulate in one pass over the basin
//! in decreasing-depth order, and every operation here is O(|basin|).

use basin_common::{BasinError, BasinResult, NodeId};
use hashbrown::HashMap;

use crate::basin::Basin;
use crate::cycles::Classification;
use crate::reverse::ReverseCsr;

/// A depth-1 subtree hanging off a cycle-entry node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subtree {
    pub root: NodeId,
    pub size: u64,
}

/// Trunkiness decomposition of one entry point.
#[derive(Debug)]
pub struct BranchDecomposition {
    pub entry: NodeId,
    /// Depth-1 subtree sizes, largest first; ties broken by ascending node id.
    pub subtrees: Vec<Subtree>,
    /// Total nodes across all subtrees (the branch, excluding the entry).
    pub branch_size: u64,
    /// Share of the largest subtree relative to the whole branch.
    pub dominance: f64,
    /// Gini concentration of the subtree sizes.
    pub gini: f64,
}

/// One step of the dominant upstream chain.
#[derive(Clone, Copy, Debug)]
pub struct ChainStep {
    pub node: NodeId,
    pub subtree_size: u64,
    /// Chosen subtree size over the total size of all candidate subtrees at
    /// this step. 1.0 for the seed step.
    pub dominance: f64,
}

/// Subtree size for every non-cycle basin member.
///
/// Members arrive sorted by (depth, node), so a reverse iteration visits
/// children before parents and the sizes fold up in one pass.
fn subtree_sizes(rev: &ReverseCsr, basin: &Basin) -> BasinResult<HashMap<u32, u64>> {
    if basin.truncated {
        return Err(BasinError::BudgetExceeded(
            "branch decomposition requires a complete basin".into(),
        ));
    }
    let mut sizes: HashMap<u32, u64> = HashMap::with_capacity(basin.members.len());
    for &(v, d) in basin.members.iter().rev() {
        if d == 0 {
            continue;
        }
        let mut size = 1u64;
        for &u in rev.predecessors(NodeId(v)) {
            if let Some(&s) = sizes.get(&u) {
                size += s;
            }
        }
        sizes.insert(v, size);
    }
    Ok(sizes)
}

fn require_cycle_member(class: &Classification, basin: &Basin, node: NodeId) -> BasinResult<()> {
    if class.terminal_of(node) != Some(basin.cycle_id) || class.depth_of(node) != Some(0) {
        return Err(BasinError::Internal(format!(
            "{node} is not a member of cycle {}",
            basin.cycle_id
        )));
    }
    Ok(())
}

/// Compute the depth-1 subtree sizes rooted at each immediate non-cycle
/// predecessor of `entry`, plus dominance and concentration metrics.
pub fn decompose_branch(
    rev: &ReverseCsr,
    class: &Classification,
    basin: &Basin,
    entry: NodeId,
) -> BasinResult<BranchDecomposition> {
    require_cycle_member(class, basin, entry)?;
    let sizes = subtree_sizes(rev, basin)?;

    let mut subtrees: Vec<Subtree> = rev
        .predecessors(entry)
        .iter()
        .filter(|&&u| class.depth_of(NodeId(u)) != Some(0))
        .map(|&u| Subtree {
            root: NodeId(u),
            size: sizes[&u],
        })
        .collect();
    subtrees.sort_by(|a, b| b.size.cmp(&a.size).then(a.root.cmp(&b.root)));

    let branch_size: u64 = subtrees.iter().map(|s| s.size).sum();
    let dominance = if branch_size == 0 {
        0.0
    } else {
        subtrees[0].size as f64 / branch_size as f64
    };
    let size_list: Vec<u64> = subtrees.iter().map(|s| s.size).collect();

    Ok(BranchDecomposition {
        entry,
        subtrees,
        branch_size,
        dominance,
        gini: gini(&size_list),
    })
}

/// Follow the dominant upstream chain from `seed`.
///
/// At each step the candidates are the current node's non-cycle
/// predecessors; the largest subtree wins, ties broken by ascending node id.
/// The chain stops before a step whose dominance ratio falls below
/// `threshold`, or when the best candidate is a leaf (no non-trivial
/// predecessor). The seed itself is the first step.
pub fn dominant_chain(
    rev: &ReverseCsr,
    class: &Classification,
    basin: &Basin,
    seed: NodeId,
    threshold: f64,
) -> BasinResult<Vec<ChainStep>> {
    if class.terminal_of(seed) != Some(basin.cycle_id) {
        return Err(BasinError::Internal(format!(
            "{seed} is not in the basin of cycle {}",
            basin.cycle_id
        )));
    }
    let sizes = subtree_sizes(rev, basin)?;

    let upstream_mass = |node: NodeId| -> u64 {
        rev.predecessors(node)
            .iter()
            .filter_map(|&u| sizes.get(&u).copied())
            .sum()
    };

    // For a cycle-member seed the recorded size is its upstream branch mass;
    // interior seeds record their own subtree size.
    let seed_size = sizes.get(&seed.0).copied().unwrap_or_else(|| upstream_mass(seed));
    let mut chain = vec![ChainStep {
        node: seed,
        subtree_size: seed_size,
        dominance: 1.0,
    }];

    let mut cur = seed;
    loop {
        let mut best: Option<(u64, u32)> = None;
        let mut total = 0u64;
        for &u in rev.predecessors(cur) {
            let Some(&s) = sizes.get(&u) else { continue };
            total += s;
            best = match best {
                Some((bs, bn)) if (bs, std::cmp::Reverse(bn)) >= (s, std::cmp::Reverse(u)) => {
                    Some((bs, bn))
                }
                _ => Some((s, u)),
            };
        }
        let Some((size, node)) = best else { break };
        if size <= 1 {
            break;
        }
        let dominance = size as f64 / total as f64;
        if dominance < threshold {
            break;
        }
        chain.push(ChainStep {
            node: NodeId(node),
            subtree_size: size,
            dominance,
        });
        cur = NodeId(node);
    }
    Ok(chain)
}

/// Gini coefficient over raw sizes: 0 = perfectly even, → 1 = concentrated.
fn gini(sizes: &[u64]) -> f64 {
    let n = sizes.len();
    if n == 0 {
        return 0.0;
    }
    let mut sorted: Vec<f64> = sizes.iter().map(|&s| s as f64).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let total: f64 = sorted.iter().sum();
    if total == 0.0 {
        return 0.0;
    }
    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, &x)| (i + 1) as f64 * x)
        .sum();
    (2.0 * weighted) / (n as f64 * total) - (n as f64 + 1.0) / n as f64
}
