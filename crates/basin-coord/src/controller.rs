//! The controller: phases A→C per N, worker-pool fan-out for D/E, then the
//! cross-N multiplex join.

use std::path::PathBuf;
use std::sync::Arc;

use hashbrown::HashMap;

use basin_common::{
    BasinError, BasinResult, CancelFlag, CycleId, EngineConfig, NodeId,
};
use basin_engine::{
    classify, decompose_branch, materialize_basin, BasinOptions, Classification, ReverseCsr,
    SuccessorMap,
};
use basin_multiplex::{
    basin_flows, find_tunnels, hyperstructure_coverage, layer_connectivity, stability_scores,
    LayerAssignment, MultiplexTable,
};
use basin_sink::{self as sink, OutputFormat};
use basin_snapshot::Snapshot;

use crate::plan::{CycleSelection, RunPlan};
use crate::task::{Task, TaskPriority, TaskQueue, TaskResult};
use crate::worker::{TaskHandler, WorkerPool};

/// What a run did, for logging and exit reporting.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub layers_computed: Vec<u32>,
    pub layers_restored: Vec<u32>,
    pub layers_failed: Vec<u32>,
    pub basins_materialized: usize,
    pub basins_truncated: usize,
}

pub struct Controller {
    snapshot: Arc<Snapshot>,
    config: EngineConfig,
    cancel: CancelFlag,
}

impl Controller {
    pub fn new(snapshot: Arc<Snapshot>, config: EngineConfig, cancel: CancelFlag) -> Self {
        Self {
            snapshot,
            config,
            cancel,
        }
    }

    /// Execute the plan. Fatal errors (bad snapshot, I/O after retry,
    /// cancellation) abort; anything else is isolated to its N and logged.
    pub fn run(&self, plan: &RunPlan) -> BasinResult<RunSummary> {
        plan.validate()?;
        std::fs::create_dir_all(&plan.out_dir)?;

        let mut summary = RunSummary::default();
        let mut layers: Vec<LayerAssignment> = Vec::new();

        for n in plan.sorted_n_set() {
            self.cancel.check()?;

            if plan.resume {
                if let Some(layer) = self.try_restore(plan, n) {
                    layers.push(layer);
                    summary.layers_restored.push(n);
                    continue;
                }
            }

            match self.run_layer(plan, n, &mut summary) {
                Ok(layer) => {
                    layers.push(layer);
                    summary.layers_computed.push(n);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(n, error = %e, "layer failed; continuing with remaining N values");
                    summary.layers_failed.push(n);
                }
            }
        }

        if layers.is_empty() {
            return Err(BasinError::Internal("no layer completed".into()));
        }

        self.cancel.check()?;
        self.run_multiplex_join(plan, layers)?;
        Ok(summary)
    }

    /// Phases A→C for one N, then the per-cycle fan-out, then the layer
    /// assignment artifact.
    fn run_layer(
        &self,
        plan: &RunPlan,
        n: u32,
        summary: &mut RunSummary,
    ) -> BasinResult<LayerAssignment> {
        let nodes = &self.snapshot.nodes;
        tracing::info!(n, "deriving successor map and classification");
        let succ = SuccessorMap::build(&self.snapshot.graph, n);
        let class = classify(&succ, &self.cancel)?;
        sink::write_cycles(&plan.out_dir, plan.format, nodes, &class)?;

        let cycles_summary: Vec<(u32, u32)> = class
            .cycles()
            .iter()
            .map(|c| (c.id.0, c.len() as u32))
            .collect();
        let sizes = sizes_from_terminal(class.raw_terminal(), class.halt_code());
        let selected = self.select_cycles(&cycles_summary, &sizes, &plan.selection);

        let layer = if selected.is_empty() {
            LayerAssignment::from_classification(class)
        } else {
            tracing::info!(n, cycles = selected.len(), "materializing selected basins");
            let rev = Arc::new(ReverseCsr::build(&succ));
            let class = Arc::new(class);

            let queue = Arc::new(TaskQueue::new());
            for (rank, &(cycle, _size)) in selected.iter().enumerate() {
                let page = nodes.page_for_node(NodeId(cycle)).0;
                // The largest basin dominates wall time; start it first.
                let priority = if rank == 0 {
                    TaskPriority::High
                } else {
                    TaskPriority::Normal
                };
                queue.push(Task::new(n, CycleId(cycle), page, priority));
            }

            let handler = self.basin_task_handler(plan, Arc::clone(&rev), Arc::clone(&class));
            let results = WorkerPool::execute(
                self.config.worker_threads,
                queue,
                &self.cancel,
                handler,
            );
            self.cancel.check()?;

            for result in results {
                match result {
                    TaskResult::Success { truncated, .. } => {
                        summary.basins_materialized += 1;
                        if truncated {
                            summary.basins_truncated += 1;
                        }
                    }
                    TaskResult::Error { cycle_page, error, .. } => {
                        if error.is_fatal() {
                            return Err(error);
                        }
                        tracing::warn!(n, cycle_page, error = %error, "basin task failed");
                    }
                }
            }

            match Arc::try_unwrap(class) {
                Ok(class) => LayerAssignment::from_classification(class),
                Err(shared) => LayerAssignment::from_classification_ref(&shared),
            }
        };

        sink::write_basin_assignments(&plan.out_dir, plan.format, nodes, &layer)?;
        Ok(layer)
    }

    fn basin_task_handler(
        &self,
        plan: &RunPlan,
        rev: Arc<ReverseCsr>,
        class: Arc<Classification>,
    ) -> Arc<TaskHandler> {
        let ctx = Arc::new(BasinTaskContext {
            snapshot: Arc::clone(&self.snapshot),
            rev,
            class,
            out_dir: plan.out_dir.clone(),
            format: plan.format,
            budget: self.config.basin_node_budget,
            decompose: plan.decompose_branches,
            cancel: self.cancel.clone(),
        });

        Arc::new(move |task: Task| match ctx.run(&task) {
            Ok(truncated) => TaskResult::Success {
                task_id: task.id,
                cycle_page: task.cycle_page,
                truncated,
            },
            Err(error) => TaskResult::Error {
                task_id: task.id,
                cycle_page: task.cycle_page,
                error,
            },
        })
    }

    /// Resolve the plan's cycle selection against one layer's cycle table.
    /// Returns (internal id, basin size), largest first.
    fn select_cycles(
        &self,
        cycles: &[(u32, u32)],
        sizes: &HashMap<u32, u64>,
        selection: &CycleSelection,
    ) -> Vec<(u32, u64)> {
        let mut picked: Vec<(u32, u64)> = match selection {
            CycleSelection::None => Vec::new(),
            CycleSelection::TopBySize(k) => {
                let mut all: Vec<(u32, u64)> = cycles
                    .iter()
                    .map(|&(id, _)| (id, sizes.get(&id).copied().unwrap_or(0)))
                    .collect();
                all.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
                all.truncate(*k);
                all
            }
            CycleSelection::Pages(pages) => {
                let mut out = Vec::new();
                for &page in pages {
                    let Some(node) = self.snapshot.nodes.node_for_page(basin_common::PageId(page))
                    else {
                        tracing::warn!(page, "selected cycle page not in snapshot; skipping");
                        continue;
                    };
                    if cycles.binary_search_by_key(&node.0, |&(id, _)| id).is_ok() {
                        out.push((node.0, sizes.get(&node.0).copied().unwrap_or(0)));
                    } else {
                        tracing::warn!(page, "selected page is not a cycle at this N; skipping");
                    }
                }
                out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
                out.dedup_by_key(|e| e.0);
                out
            }
        };
        picked.dedup_by_key(|e| e.0);
        picked
    }

    /// Checkpoint probe: restore the layer from existing artifacts if they
    /// are complete and schema-compatible, otherwise recompute.
    fn try_restore(&self, plan: &RunPlan, n: u32) -> Option<LayerAssignment> {
        let dir = &plan.out_dir;
        let format = plan.format;
        let cycles_path = sink::cycles_path(dir, format, n);
        let assignments_path = sink::basin_assignments_path(dir, format, n);
        if !cycles_path.exists() || !assignments_path.exists() {
            return None;
        }
        if !sink::schema_matches(&cycles_path, &sink::schemas::cycles(), format)
            || !sink::schema_matches(
                &assignments_path,
                &sink::schemas::basin_assignments(),
                format,
            )
        {
            tracing::warn!(n, "existing artifacts are schema-incompatible; recomputing");
            return None;
        }

        let layer = match sink::restore_layer(dir, format, n, &self.snapshot.nodes) {
            Ok(layer) => layer,
            Err(e) => {
                tracing::warn!(n, error = %e, "cannot restore checkpoint; recomputing");
                return None;
            }
        };

        // The per-cycle artifacts for the selected cycles must exist too.
        let sizes = layer_sizes(&layer);
        let selected = self.select_cycles(layer.cycles(), &sizes, &plan.selection);
        for &(cycle, _) in &selected {
            let page = self.snapshot.nodes.page_for_node(NodeId(cycle)).0;
            let members = sink::basin_members_path(dir, format, n, page);
            let layers = sink::basin_layers_path(dir, format, n, page);
            if !members.exists() || !layers.exists() {
                tracing::warn!(n, cycle_page = page, "per-cycle artifacts missing; recomputing");
                return None;
            }
        }

        tracing::info!(n, "checkpoint hit; skipping layer");
        Some(layer)
    }

    /// Phase F + G: join the layers and write every cross-N artifact.
    fn run_multiplex_join(
        &self,
        plan: &RunPlan,
        layers: Vec<LayerAssignment>,
    ) -> BasinResult<()> {
        let nodes = &self.snapshot.nodes;
        let dir = &plan.out_dir;
        let format = plan.format;

        let table = MultiplexTable::from_layers(layers)?;
        sink::write_multiplex_assignments(dir, format, nodes, &table)?;

        let tunnels = find_tunnels(&table, self.config.tunnel_score_constant);
        sink::write_tunnel_nodes(dir, format, nodes, &tunnels)?;

        let matrix = layer_connectivity(&table);
        sink::write_layer_connectivity(dir, format, &matrix)?;

        let flows = basin_flows(&table);
        sink::write_basin_flows(dir, format, nodes, &flows)?;

        let scores = stability_scores(&table);
        sink::write_basin_stability(dir, format, nodes, &scores)?;

        let coverage = hyperstructure_coverage(&table);
        sink::write_coverage(dir, format, &coverage)?;

        tracing::info!(
            layers = table.layers().len(),
            tunnels = tunnels.len(),
            coverage = coverage.fraction(),
            "multiplex join complete"
        );
        Ok(())
    }
}

/// Basin size per cycle id, from a raw terminal array.
fn sizes_from_terminal(terminal: &[u32], halt_code: u32) -> HashMap<u32, u64> {
    let mut sizes = HashMap::new();
    for &t in terminal {
        if t != halt_code {
            *sizes.entry(t).or_insert(0u64) += 1;
        }
    }
    sizes
}

fn layer_sizes(layer: &LayerAssignment) -> HashMap<u32, u64> {
    let mut sizes = HashMap::new();
    for v in 0..layer.num_nodes() {
        if let Some(c) = layer.terminal(v) {
            *sizes.entry(c).or_insert(0u64) += 1;
        }
    }
    sizes
}

/// Everything a worker needs to run one per-cycle job: the shared read-only
/// state for the current N plus the output settings.
struct BasinTaskContext {
    snapshot: Arc<Snapshot>,
    rev: Arc<ReverseCsr>,
    class: Arc<Classification>,
    out_dir: PathBuf,
    format: OutputFormat,
    budget: Option<u64>,
    decompose: bool,
    cancel: CancelFlag,
}

impl BasinTaskContext {
    /// Materialize a basin, write its artifacts, and, when enabled, the
    /// trunkiness decomposition of every entry point. Returns the
    /// truncation flag.
    fn run(&self, task: &Task) -> BasinResult<bool> {
        let nodes = &self.snapshot.nodes;
        let opts = BasinOptions {
            node_budget: self.budget,
            record_parents: false,
        };
        let basin = materialize_basin(&self.rev, &self.class, task.cycle, &opts, &self.cancel)?;
        sink::write_basin_members(&self.out_dir, self.format, nodes, task.n, &basin)?;
        sink::write_basin_layers(&self.out_dir, self.format, nodes, task.n, &basin)?;

        if self.decompose {
            if basin.truncated {
                tracing::warn!(
                    n = task.n,
                    cycle_page = task.cycle_page,
                    "basin truncated; skipping branch decomposition"
                );
            } else {
                let cycle = self.class.cycles().get(task.cycle).ok_or_else(|| {
                    BasinError::Internal("selected cycle missing from table".into())
                })?;
                let mut decompositions = Vec::new();
                for &entry in &cycle.members {
                    let has_branch = self
                        .rev
                        .predecessors(entry)
                        .iter()
                        .any(|&u| self.class.depth_of(NodeId(u)) != Some(0));
                    if has_branch {
                        decompositions.push(decompose_branch(
                            &self.rev, &self.class, &basin, entry,
                        )?);
                    }
                }
                sink::write_branches(
                    &self.out_dir,
                    self.format,
                    nodes,
                    task.n,
                    task.cycle_page,
                    &decompositions,
                )?;
            }
        }
        Ok(basin.truncated)
    }
}
