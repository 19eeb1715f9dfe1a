//! Per-layer terminal assignments and the multiplex table.

use basin_common::{BasinError, BasinResult, CancelFlag};
use basin_engine::{classify, Classification, SuccessorMap, HALT_DEPTH};
use basin_snapshot::CsrGraph;

/// One layer of the multiplex: the terminal assignment of every node at a
/// fixed N. Cycle member lists are dropped; only (id, length) summaries are
/// kept so per-layer state stays two flat arrays.
#[derive(Debug)]
pub struct LayerAssignment {
    n: u32,
    halt_code: u32,
    terminal: Vec<u32>,
    depth: Vec<u32>,
    /// (cycle id, length), ascending by id.
    cycles: Vec<(u32, u32)>,
}

impl LayerAssignment {
    pub fn from_classification(class: Classification) -> Self {
        let (n, halt_code, terminal, depth, cycles) = class.into_parts();
        let cycles = cycles
            .iter()
            .map(|c| (c.id.0, c.len() as u32))
            .collect();
        Self {
            n,
            halt_code,
            terminal,
            depth,
            cycles,
        }
    }

    /// As [`Self::from_classification`], but cloning the flat arrays so a
    /// cached classification can stay alive (point-query surface).
    pub fn from_classification_ref(class: &Classification) -> Self {
        Self {
            n: class.n(),
            halt_code: class.halt_code(),
            terminal: class.raw_terminal().to_vec(),
            depth: class.raw_depth().to_vec(),
            cycles: class
                .cycles()
                .iter()
                .map(|c| (c.id.0, c.len() as u32))
                .collect(),
        }
    }

    /// Reassemble a layer from raw arrays, e.g. restored from checkpoint
    /// artifacts. `terminal` uses `halt_code` (= node count) for HALT and
    /// `depth` uses [`HALT_DEPTH`]; `cycles` is (id, length) ascending.
    pub fn from_raw(
        n: u32,
        halt_code: u32,
        terminal: Vec<u32>,
        depth: Vec<u32>,
        cycles: Vec<(u32, u32)>,
    ) -> BasinResult<Self> {
        if terminal.len() != depth.len() || terminal.len() != halt_code as usize {
            return Err(BasinError::Internal(
                "layer arrays disagree with halt code".into(),
            ));
        }
        Ok(Self {
            n,
            halt_code,
            terminal,
            depth,
            cycles,
        })
    }

    #[inline]
    pub fn n(&self) -> u32 {
        self.n
    }

    #[inline]
    pub fn num_nodes(&self) -> u32 {
        self.terminal.len() as u32
    }

    /// Cycle id the node resolves to, or `None` for HALT.
    #[inline]
    pub fn terminal(&self, v: u32) -> Option<u32> {
        let t = self.terminal[v as usize];
        (t != self.halt_code).then_some(t)
    }

    #[inline]
    pub fn depth(&self, v: u32) -> Option<u32> {
        let d = self.depth[v as usize];
        (d != HALT_DEPTH).then_some(d)
    }

    /// (cycle id, length) summaries, ascending by id.
    pub fn cycles(&self) -> &[(u32, u32)] {
        &self.cycles
    }
}

/// All configured layers, ascending by N.
pub struct MultiplexTable {
    layers: Vec<LayerAssignment>,
}

impl MultiplexTable {
    /// Run successor derivation + classification for each N in `n_set`.
    ///
    /// Layers are computed one at a time so peak memory stays bounded by a
    /// single layer's working set; cross-N parallelism is the controller's
    /// call, not this builder's.
    pub fn build(graph: &CsrGraph, n_set: &[u32], cancel: &CancelFlag) -> BasinResult<Self> {
        let mut ns: Vec<u32> = n_set.to_vec();
        ns.sort_unstable();
        ns.dedup();
        let mut layers = Vec::with_capacity(ns.len());
        for n in ns {
            let succ = SuccessorMap::build(graph, n);
            let class = classify(&succ, cancel)?;
            tracing::info!(n, cycles = class.cycles().len(), "layer classified");
            layers.push(LayerAssignment::from_classification(class));
        }
        Self::from_layers(layers)
    }

    /// Assemble from prebuilt layers (e.g. restored from checkpoints).
    pub fn from_layers(mut layers: Vec<LayerAssignment>) -> BasinResult<Self> {
        layers.sort_by_key(|l| l.n);
        if layers.windows(2).any(|w| w[0].n == w[1].n) {
            return Err(BasinError::Internal("duplicate N in multiplex layers".into()));
        }
        if layers.windows(2).any(|w| w[0].num_nodes() != w[1].num_nodes()) {
            return Err(BasinError::Internal(
                "multiplex layers disagree on node count".into(),
            ));
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[LayerAssignment] {
        &self.layers
    }

    pub fn layer(&self, n: u32) -> Option<&LayerAssignment> {
        self.layers.iter().find(|l| l.n == n)
    }

    pub fn n_values(&self) -> Vec<u32> {
        self.layers.iter().map(|l| l.n).collect()
    }

    pub fn num_nodes(&self) -> u32 {
        self.layers.first().map(|l| l.num_nodes()).unwrap_or(0)
    }
}
