//! Cross-layer reductions: connectivity matrix, basin flows, stability,
//! and hyperstructure coverage.

use hashbrown::HashMap;

use crate::assignment::MultiplexTable;

/// N×N totals of "same cycle identity" vs "different cycle identity".
///
/// A page counts toward a pair (N₁, N₂) only when it resolves to a cycle in
/// both layers; pages halting in either layer are excluded from that pair.
pub struct LayerMatrix {
    n_values: Vec<u32>,
    same: Vec<u64>,
    diff: Vec<u64>,
}

impl LayerMatrix {
    pub fn n_values(&self) -> &[u32] {
        &self.n_values
    }

    fn index_of(&self, n: u32) -> Option<usize> {
        self.n_values.iter().position(|&x| x == n)
    }

    pub fn same_count(&self, n_src: u32, n_dst: u32) -> Option<u64> {
        let (i, j) = (self.index_of(n_src)?, self.index_of(n_dst)?);
        Some(self.same[i * self.n_values.len() + j])
    }

    pub fn diff_count(&self, n_src: u32, n_dst: u32) -> Option<u64> {
        let (i, j) = (self.index_of(n_src)?, self.index_of(n_dst)?);
        Some(self.diff[i * self.n_values.len() + j])
    }

    /// All ordered (n_src, n_dst, same, diff) entries, row-major.
    pub fn entries(&self) -> impl Iterator<Item = (u32, u32, u64, u64)> + '_ {
        let k = self.n_values.len();
        (0..k * k).map(move |idx| {
            (
                self.n_values[idx / k],
                self.n_values[idx % k],
                self.same[idx],
                self.diff[idx],
            )
        })
    }
}

/// Count same-cycle / different-cycle pages for every ordered layer pair.
pub fn layer_connectivity(table: &MultiplexTable) -> LayerMatrix {
    let layers = table.layers();
    let k = layers.len();
    let mut same = vec![0u64; k * k];
    let mut diff = vec![0u64; k * k];

    let mut resolved: Vec<Option<u32>> = vec![None; k];
    for v in 0..table.num_nodes() {
        for (i, layer) in layers.iter().enumerate() {
            resolved[i] = layer.terminal(v);
        }
        for i in 0..k {
            let Some(a) = resolved[i] else { continue };
            for j in 0..k {
                let Some(b) = resolved[j] else { continue };
                if a == b {
                    same[i * k + j] += 1;
                } else {
                    diff[i * k + j] += 1;
                }
            }
        }
    }

    LayerMatrix {
        n_values: table.n_values(),
        same,
        diff,
    }
}

/// Page flow between cycle identities across one N step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BasinFlow {
    pub from_n: u32,
    pub to_n: u32,
    /// `None` = HALT on that side.
    pub from_cycle: Option<u32>,
    pub to_cycle: Option<u32>,
    pub count: u64,
}

/// Group pages by (assignment at N, assignment at next N) for each
/// consecutive layer pair. Sorted by (from_n, from_cycle, to_cycle) with
/// HALT ordered last.
pub fn basin_flows(table: &MultiplexTable) -> Vec<BasinFlow> {
    let mut flows = Vec::new();
    for pair in table.layers().windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        let mut counts: HashMap<(Option<u32>, Option<u32>), u64> = HashMap::new();
        for v in 0..table.num_nodes() {
            *counts.entry((from.terminal(v), to.terminal(v))).or_insert(0) += 1;
        }
        let mut entries: Vec<BasinFlow> = counts
            .into_iter()
            .map(|((from_cycle, to_cycle), count)| BasinFlow {
                from_n: from.n(),
                to_n: to.n(),
                from_cycle,
                to_cycle,
                count,
            })
            .collect();
        entries.sort_by_key(|f| (halt_last(f.from_cycle), halt_last(f.to_cycle)));
        flows.extend(entries);
    }
    flows
}

fn halt_last(cycle: Option<u32>) -> u64 {
    cycle.map(|c| c as u64).unwrap_or(u64::MAX)
}

/// Persistence of one cycle identity across the configured layers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StabilityScore {
    pub cycle_id: u32,
    /// Number of layers in which a cycle with this identity exists.
    pub layers_present: u32,
    /// Pages assigned to this identity, summed over all layers.
    pub total_pages: u64,
    /// `layers_present / |N_set|`.
    pub persistence: f64,
}

/// Score every cycle identity seen in any layer, ascending by id.
pub fn stability_scores(table: &MultiplexTable) -> Vec<StabilityScore> {
    let mut present: HashMap<u32, u32> = HashMap::new();
    let mut totals: HashMap<u32, u64> = HashMap::new();

    for layer in table.layers() {
        for &(id, _) in layer.cycles() {
            *present.entry(id).or_insert(0) += 1;
        }
        for v in 0..table.num_nodes() {
            if let Some(c) = layer.terminal(v) {
                *totals.entry(c).or_insert(0) += 1;
            }
        }
    }

    let num_layers = table.layers().len() as f64;
    let mut scores: Vec<StabilityScore> = present
        .into_iter()
        .map(|(cycle_id, layers_present)| StabilityScore {
            cycle_id,
            layers_present,
            total_pages: totals.get(&cycle_id).copied().unwrap_or(0),
            persistence: layers_present as f64 / num_layers,
        })
        .collect();
    scores.sort_by_key(|s| s.cycle_id);
    scores
}

/// Fraction of the snapshot inside the hyperstructure: the union of all
/// basins over all configured N.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Coverage {
    pub covered: u64,
    pub total: u64,
}

impl Coverage {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.covered as f64 / self.total as f64
        }
    }
}

pub fn hyperstructure_coverage(table: &MultiplexTable) -> Coverage {
    let total = table.num_nodes() as u64;
    let mut covered = 0u64;
    for v in 0..table.num_nodes() {
        if table.layers().iter().any(|l| l.terminal(v).is_some()) {
            covered += 1;
        }
    }
    Coverage { covered, total }
}
