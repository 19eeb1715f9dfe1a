//! The query facade: snapshot + per-N derived state + point queries.

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use hashbrown::HashMap;

use basin_common::{
    BasinError, BasinResult, CancelFlag, CycleId, EngineConfig, NodeId, PageId,
};
use basin_engine::{
    classify, dominant_chain, materialize_basin, BasinOptions, Classification, ReverseCsr,
    SuccessorMap,
};
use basin_multiplex::{layer_connectivity, LayerAssignment, LayerMatrix, MultiplexTable};
use basin_snapshot::{Snapshot, SnapshotLoader};

/// Derived state for one N, computed once and shared. The reverse CSR is
/// built lazily since pure traces never need it.
pub struct LayerState {
    pub succ: SuccessorMap,
    pub class: Classification,
    reverse: OnceLock<ReverseCsr>,
}

impl LayerState {
    fn compute(snapshot: &Snapshot, n: u32, cancel: &CancelFlag) -> BasinResult<Self> {
        let succ = SuccessorMap::build(&snapshot.graph, n);
        let class = classify(&succ, cancel)?;
        Ok(Self {
            succ,
            class,
            reverse: OnceLock::new(),
        })
    }

    pub fn reverse(&self) -> &ReverseCsr {
        self.reverse.get_or_init(|| ReverseCsr::build(&self.succ))
    }
}

/// Result of tracing one page under one N.
#[derive(Clone, Debug, PartialEq)]
pub struct Trace {
    /// Visited pages, starting at the queried page, truncated to
    /// `max_steps` hops.
    pub path: Vec<PageId>,
    /// Exact steps to the terminal (first cycle contact, or the halting
    /// node), independent of the path cap.
    pub steps: u32,
    pub terminal: TraceTerminal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceTerminal {
    Cycle { cycle_id: PageId, length: u32 },
    Halt,
}

/// One step of a dominant upstream chain, page-id mapped.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceChainStep {
    pub page: PageId,
    pub subtree_size: u64,
    pub dominance: f64,
}

/// One layer's entry of a cross-N trace.
#[derive(Clone, Debug, PartialEq)]
pub struct CrossTrace {
    pub n: u32,
    pub steps: u32,
    pub terminal: TraceTerminal,
    /// Member pages of the terminal cycle, orbit order; empty for HALT.
    pub cycle_members: Vec<PageId>,
}

/// The engine facade. Shares one immutable snapshot across all queries and
/// caches per-N layers on first use.
pub struct Engine {
    snapshot: Arc<Snapshot>,
    config: EngineConfig,
    cancel: CancelFlag,
    layers: Mutex<HashMap<u32, Arc<LayerState>>>,
}

impl Engine {
    /// Load the snapshot from the two input tables and wrap it.
    pub fn open(
        pages_path: &Path,
        links_path: &Path,
        config: EngineConfig,
    ) -> BasinResult<Self> {
        let cancel = CancelFlag::new();
        let snapshot = SnapshotLoader::new(pages_path, links_path).load(&cancel)?;
        Ok(Self::with_snapshot(Arc::new(snapshot), config))
    }

    pub fn with_snapshot(snapshot: Arc<Snapshot>, config: EngineConfig) -> Self {
        Self {
            snapshot,
            config,
            cancel: CancelFlag::new(),
            layers: Mutex::new(HashMap::new()),
        }
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared cancellation flag; cancel() aborts in-flight computations.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Derived state for N, computing it on first request. The lock is held
    /// across computation so a layer is derived exactly once.
    pub fn layer(&self, n: u32) -> BasinResult<Arc<LayerState>> {
        if n < 1 {
            return Err(BasinError::Internal(format!("invalid N {n}")));
        }
        let mut layers = self.layers.lock().unwrap();
        if let Some(layer) = layers.get(&n) {
            return Ok(Arc::clone(layer));
        }
        tracing::info!(n, "deriving layer state");
        let state = Arc::new(LayerState::compute(&self.snapshot, n, &self.cancel)?);
        layers.insert(n, Arc::clone(&state));
        Ok(state)
    }

    /// Drop cached layers outside `keep`, releasing their memory.
    pub fn release_layers_except(&self, keep: &[u32]) {
        let mut layers = self.layers.lock().unwrap();
        layers.retain(|n, _| keep.contains(n));
    }

    fn node(&self, page: PageId) -> BasinResult<NodeId> {
        self.snapshot
            .nodes
            .node_for_page(page)
            .ok_or(BasinError::NodeNotFound(page.0))
    }

    fn page(&self, node: NodeId) -> PageId {
        self.snapshot.nodes.page_for_node(node)
    }

    /// Follow `f_N` from a page: full path up to `max_steps` hops, exact
    /// step count, and the terminal. `None` uses the configured
    /// `trace_max_steps`.
    pub fn trace(&self, page: PageId, n: u32, max_steps: Option<u32>) -> BasinResult<Trace> {
        let max_steps = max_steps.unwrap_or(self.config.trace_max_steps);
        let start = self.node(page)?;
        let layer = self.layer(n)?;

        let mut path = vec![page];
        match layer.class.terminal_of(start) {
            Some(cycle_id) => {
                let steps = layer.class.depth_of(start).unwrap_or(0);
                let mut cur = start;
                for _ in 0..steps.min(max_steps) {
                    // A non-member node always has a successor on the way in.
                    cur = layer.succ.successor(cur).ok_or_else(|| {
                        BasinError::Internal("cycle-bound walk hit HALT".into())
                    })?;
                    path.push(self.page(cur));
                }
                let length = layer
                    .class
                    .cycles()
                    .get(cycle_id)
                    .map(|c| c.len() as u32)
                    .unwrap_or(0);
                Ok(Trace {
                    path,
                    steps,
                    terminal: TraceTerminal::Cycle {
                        cycle_id: self.page(cycle_id.node()),
                        length,
                    },
                })
            }
            None => {
                let mut cur = start;
                let mut steps = 0u32;
                while let Some(next) = layer.succ.successor(cur) {
                    steps += 1;
                    if steps <= max_steps {
                        path.push(self.page(next));
                    }
                    cur = next;
                }
                Ok(Trace {
                    path,
                    steps,
                    terminal: TraceTerminal::Halt,
                })
            }
        }
    }

    /// Trace one page at every N in `n_set`, ascending.
    pub fn trace_across(&self, page: PageId, n_set: &[u32]) -> BasinResult<Vec<CrossTrace>> {
        let start = self.node(page)?;
        let mut ns: Vec<u32> = n_set.to_vec();
        ns.sort_unstable();
        ns.dedup();

        let mut out = Vec::with_capacity(ns.len());
        for n in ns {
            let layer = self.layer(n)?;
            let entry = match layer.class.terminal_of(start) {
                Some(cycle_id) => {
                    let cycle = layer.class.cycles().get(cycle_id).ok_or_else(|| {
                        BasinError::Internal("terminal cycle missing from table".into())
                    })?;
                    CrossTrace {
                        n,
                        steps: layer.class.depth_of(start).unwrap_or(0),
                        terminal: TraceTerminal::Cycle {
                            cycle_id: self.page(cycle_id.node()),
                            length: cycle.len() as u32,
                        },
                        cycle_members: cycle.members.iter().map(|&m| self.page(m)).collect(),
                    }
                }
                None => CrossTrace {
                    n,
                    steps: self.trace(page, n, Some(0))?.steps,
                    terminal: TraceTerminal::Halt,
                    cycle_members: Vec::new(),
                },
            };
            out.push(entry);
        }
        Ok(out)
    }

    /// All cycles at N as (cycle page id, length), ascending by id.
    pub fn cycles(&self, n: u32) -> BasinResult<Vec<(PageId, u32)>> {
        let layer = self.layer(n)?;
        Ok(layer
            .class
            .cycles()
            .iter()
            .map(|c| (self.page(c.id.node()), c.len() as u32))
            .collect())
    }

    /// Stream the basin of a cycle as (page id, depth), depth-major. An
    /// optional row cap truncates deterministically (lowest ids kept).
    pub fn basin_of(
        &self,
        n: u32,
        cycle_page: PageId,
        max_rows: Option<u64>,
    ) -> BasinResult<impl Iterator<Item = (PageId, u32)>> {
        let cycle_node = self
            .snapshot
            .nodes
            .node_for_page(cycle_page)
            .ok_or(BasinError::CycleNotFound {
                n,
                cycle_id: cycle_page.0,
            })?;
        let layer = self.layer(n)?;
        let basin = materialize_basin(
            layer.reverse(),
            &layer.class,
            CycleId(cycle_node.0),
            &BasinOptions {
                node_budget: max_rows.or(self.config.basin_node_budget),
                record_parents: false,
            },
            &self.cancel,
        )
        .map_err(|e| match e {
            // Remap the internal id to the external one the caller used.
            BasinError::CycleNotFound { n, .. } => BasinError::CycleNotFound {
                n,
                cycle_id: cycle_page.0,
            },
            other => other,
        })?;

        let snapshot = Arc::clone(&self.snapshot);
        Ok(basin
            .members
            .into_iter()
            .map(move |(node, depth)| (snapshot.nodes.page_for_node(NodeId(node)), depth)))
    }

    /// Walk the dominant upstream chain ("source of the Nile") for a cycle
    /// at N, starting from `seed_page` (default: the cycle identity node).
    /// Requires a complete basin, so any configured node budget is ignored.
    pub fn source_chain(
        &self,
        n: u32,
        cycle_page: PageId,
        seed_page: Option<PageId>,
    ) -> BasinResult<Vec<SourceChainStep>> {
        let cycle_node = self
            .snapshot
            .nodes
            .node_for_page(cycle_page)
            .ok_or(BasinError::CycleNotFound {
                n,
                cycle_id: cycle_page.0,
            })?;
        let seed = match seed_page {
            Some(page) => self.node(page)?,
            None => cycle_node,
        };
        let layer = self.layer(n)?;
        let basin = materialize_basin(
            layer.reverse(),
            &layer.class,
            CycleId(cycle_node.0),
            &BasinOptions::default(),
            &self.cancel,
        )?;
        let chain = dominant_chain(
            layer.reverse(),
            &layer.class,
            &basin,
            seed,
            self.config.dominance_threshold,
        )?;
        Ok(chain
            .into_iter()
            .map(|step| SourceChainStep {
                page: self.page(step.node),
                subtree_size: step.subtree_size,
                dominance: step.dominance,
            })
            .collect())
    }

    /// The N×N same/different-cycle matrix over `n_set`.
    pub fn layer_matrix(&self, n_set: &[u32]) -> BasinResult<LayerMatrix> {
        let mut ns: Vec<u32> = n_set.to_vec();
        ns.sort_unstable();
        ns.dedup();
        let mut assignments = Vec::with_capacity(ns.len());
        for n in ns {
            let layer = self.layer(n)?;
            assignments.push(LayerAssignment::from_classification_ref(&layer.class));
        }
        let table = MultiplexTable::from_layers(assignments)?;
        Ok(layer_connectivity(&table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basin_snapshot::{CsrGraph, NodeTable};
    use smol_str::SmolStr;

    /// Spec graph with page ids 100..140 step 10.
    fn engine() -> Engine {
        let graph = CsrGraph::from_adjacency(&[
            vec![1, 2],
            vec![0, 3],
            vec![3],
            vec![3, 4],
            vec![0],
        ]);
        let nodes = NodeTable::new(
            (0..5)
                .map(|i| (100 + i as i64 * 10, SmolStr::new(format!("Page{i}"))))
                .collect(),
        );
        Engine::with_snapshot(
            Arc::new(Snapshot { graph, nodes }),
            EngineConfig::default(),
        )
    }

    #[test]
    fn trace_to_cycle() {
        let e = engine();
        // Node 4 (page 140) -> 0 -> cycle {0,1} at N=1.
        let t = e.trace(PageId(140), 1, Some(10)).unwrap();
        assert_eq!(t.steps, 1);
        assert_eq!(t.path, vec![PageId(140), PageId(100)]);
        assert_eq!(
            t.terminal,
            TraceTerminal::Cycle {
                cycle_id: PageId(100),
                length: 2
            }
        );
    }

    #[test]
    fn trace_path_respects_cap() {
        let e = engine();
        let t = e.trace(PageId(140), 1, Some(0)).unwrap();
        assert_eq!(t.path, vec![PageId(140)]);
        assert_eq!(t.steps, 1); // exact steps survive the cap
    }

    #[test]
    fn trace_defaults_to_configured_step_cap() {
        let graph = CsrGraph::from_adjacency(&[
            vec![1, 2],
            vec![0, 3],
            vec![3],
            vec![3, 4],
            vec![0],
        ]);
        let nodes = NodeTable::new(
            (0..5)
                .map(|i| (100 + i as i64 * 10, SmolStr::new(format!("Page{i}"))))
                .collect(),
        );
        let config = EngineConfig {
            trace_max_steps: 1,
            ..EngineConfig::default()
        };
        let e = Engine::with_snapshot(Arc::new(Snapshot { graph, nodes }), config);
        // At N=2, page 110 halts after 2 steps; the configured cap of 1
        // truncates the path but not the step count.
        let t = e.trace(PageId(110), 2, None).unwrap();
        assert_eq!(t.path, vec![PageId(110), PageId(130)]);
        assert_eq!(t.steps, 2);
    }

    #[test]
    fn trace_to_halt() {
        let e = engine();
        // At N=2: 1 -> 3 -> 4 -> HALT.
        let t = e.trace(PageId(110), 2, Some(10)).unwrap();
        assert_eq!(t.terminal, TraceTerminal::Halt);
        assert_eq!(t.steps, 2);
        assert_eq!(t.path, vec![PageId(110), PageId(130), PageId(140)]);
    }

    #[test]
    fn trace_unknown_page() {
        let e = engine();
        let err = e.trace(PageId(999), 1, Some(10)).unwrap_err();
        assert!(matches!(err, BasinError::NodeNotFound(999)));
    }

    #[test]
    fn trace_across_layers() {
        let e = engine();
        let traces = e.trace_across(PageId(110), &[2, 1]).unwrap();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].n, 1);
        assert_eq!(
            traces[0].terminal,
            TraceTerminal::Cycle {
                cycle_id: PageId(100),
                length: 2
            }
        );
        assert_eq!(traces[0].cycle_members, vec![PageId(100), PageId(110)]);
        assert_eq!(traces[1].n, 2);
        assert_eq!(traces[1].terminal, TraceTerminal::Halt);
    }

    #[test]
    fn cycles_listing() {
        let e = engine();
        assert_eq!(
            e.cycles(1).unwrap(),
            vec![(PageId(100), 2), (PageId(130), 1)]
        );
        assert!(e.cycles(2).unwrap().is_empty());
    }

    #[test]
    fn basin_stream() {
        let e = engine();
        let rows: Vec<_> = e.basin_of(1, PageId(100), None).unwrap().collect();
        assert_eq!(
            rows,
            vec![(PageId(100), 0), (PageId(110), 0), (PageId(140), 1)]
        );
    }

    #[test]
    fn basin_of_non_cycle_page() {
        let e = engine();
        let err = e.basin_of(1, PageId(140), None).unwrap_err();
        assert!(matches!(
            err,
            BasinError::CycleNotFound { n: 1, cycle_id: 140 }
        ));
    }

    #[test]
    fn layer_matrix_totals() {
        let e = engine();
        let m = e.layer_matrix(&[1, 2]).unwrap();
        assert_eq!(m.same_count(1, 1), Some(5));
        assert_eq!(m.same_count(2, 2), Some(0));
    }

    #[test]
    fn source_chain_from_entry() {
        // 140 -> 100 is the only branch into the {100, 110} cycle.
        let e = engine();
        let chain = e.source_chain(1, PageId(100), None).unwrap();
        assert_eq!(chain[0].page, PageId(100));
        assert!((chain[0].dominance - 1.0).abs() < 1e-12);
        // 140 is a leaf, so the chain stops at the seed.
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn source_chain_unknown_cycle() {
        let e = engine();
        let err = e.source_chain(1, PageId(999), None).unwrap_err();
        assert!(matches!(err, BasinError::CycleNotFound { .. }));
    }

    #[test]
    fn layers_are_cached() {
        let e = engine();
        let a = e.layer(1).unwrap();
        let b = e.layer(1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        e.release_layers_except(&[]);
        let c = e.layer(1).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
