//! Snapshot loader: streaming passes over the ingested tables.
//!
//! Pass 1 reads `pages`, keeps namespace-0 non-redirect rows, and assigns
//! dense node ids by sorted page id. Passes 2 and 3 stream `nlink_sequences`
//! with count-then-scatter into CSR form. Links to filtered-out or dangling
//! targets are dropped and their positional slots close up, so stored
//! positions are dense 1-based again.

use std::path::{Path, PathBuf};

use hashbrown::HashSet;
use smol_str::SmolStr;

use basin_common::{BasinError, BasinResult, CancelFlag, PageId, CANCEL_CHECK_STRIDE};

use crate::csr::CsrGraph;
use crate::reader::{open_links_reader, open_pages_reader, LinkRow};
use crate::table::NodeTable;
use crate::Snapshot;

pub struct SnapshotLoader {
    pages_path: PathBuf,
    links_path: PathBuf,
}

impl SnapshotLoader {
    pub fn new(pages_path: impl Into<PathBuf>, links_path: impl Into<PathBuf>) -> Self {
        Self {
            pages_path: pages_path.into(),
            links_path: links_path.into(),
        }
    }

    /// Materialize the snapshot. Fails with `BadSnapshot` on structural
    /// violations: duplicate page ids, unsorted sequences, non-positive
    /// positions, or links from pages absent from the `pages` table.
    pub fn load(&self, cancel: &CancelFlag) -> BasinResult<Snapshot> {
        let (nodes, known_pages) = self.load_pages(cancel)?;
        tracing::info!(
            nodes = nodes.len(),
            "assigned dense node ids over namespace-0 non-redirect pages"
        );

        let degrees = self.count_degrees(&nodes, &known_pages, cancel)?;

        let mut offsets = Vec::with_capacity(nodes.len() + 1);
        let mut total = 0u64;
        offsets.push(0u64);
        for &d in &degrees {
            total += d as u64;
            offsets.push(total);
        }

        let targets = self.scatter_targets(&nodes, &offsets, total, cancel)?;

        let graph = CsrGraph::from_parts(offsets, targets)?;
        tracing::info!(
            nodes = graph.num_nodes(),
            edges = graph.num_edges(),
            bytes = graph.memory_footprint(),
            "snapshot loaded"
        );
        Ok(Snapshot { graph, nodes })
    }

    fn load_pages(&self, cancel: &CancelFlag) -> BasinResult<(NodeTable, HashSet<i64>)> {
        let mut known_pages = HashSet::new();
        let mut kept: Vec<(i64, SmolStr)> = Vec::new();

        for (i, row) in open_pages_reader(&self.pages_path)?.enumerate() {
            if i % CANCEL_CHECK_STRIDE == 0 {
                cancel.check()?;
            }
            let row = row?;
            if !known_pages.insert(row.page_id) {
                return Err(BasinError::BadSnapshot(format!(
                    "duplicate page_id {} in pages",
                    row.page_id
                )));
            }
            if row.namespace == 0 && !row.is_redirect {
                kept.push((row.page_id, row.title));
            }
        }

        if kept.len() >= u32::MAX as usize {
            return Err(BasinError::BadSnapshot(format!(
                "{} nodes exceed the u32 id space",
                kept.len()
            )));
        }
        kept.sort_unstable_by_key(|(id, _)| *id);
        Ok((NodeTable::new(kept), known_pages))
    }

    /// Pass 2: validate ordering and count the surviving out-degree per node.
    fn count_degrees(
        &self,
        nodes: &NodeTable,
        known_pages: &HashSet<i64>,
        cancel: &CancelFlag,
    ) -> BasinResult<Vec<u32>> {
        let mut degrees = vec![0u32; nodes.len()];
        let mut prev: Option<(i64, i32)> = None;

        for (i, row) in open_links_reader(&self.links_path)?.enumerate() {
            if i % CANCEL_CHECK_STRIDE == 0 {
                cancel.check()?;
            }
            let row = row?;
            if row.position <= 0 {
                return Err(BasinError::BadSnapshot(format!(
                    "non-positive position {} for page {}",
                    row.position, row.from_page_id
                )));
            }
            if let Some((pf, pp)) = prev {
                if (row.from_page_id, row.position) <= (pf, pp) {
                    return Err(BasinError::BadSnapshot(format!(
                        "nlink_sequences not sorted at page {} position {}",
                        row.from_page_id, row.position
                    )));
                }
            }
            prev = Some((row.from_page_id, row.position));
            if !known_pages.contains(&row.from_page_id) {
                return Err(BasinError::BadSnapshot(format!(
                    "link source page {} not in pages",
                    row.from_page_id
                )));
            }
            if let Some(from) = self.resolve(nodes, &row) {
                degrees[from.index()] += 1;
            }
        }
        Ok(degrees)
    }

    /// Pass 3: fill the target array with the same filter as pass 2.
    fn scatter_targets(
        &self,
        nodes: &NodeTable,
        offsets: &[u64],
        total: u64,
        cancel: &CancelFlag,
    ) -> BasinResult<Vec<u32>> {
        let mut targets = vec![0u32; total as usize];
        let mut cursor: Vec<u64> = offsets[..offsets.len() - 1].to_vec();

        for (i, row) in open_links_reader(&self.links_path)?.enumerate() {
            if i % CANCEL_CHECK_STRIDE == 0 {
                cancel.check()?;
            }
            let row = row?;
            if let Some(from) = self.resolve(nodes, &row) {
                let to = nodes.node_for_page(PageId(row.to_page_id)).unwrap();
                targets[cursor[from.index()] as usize] = to.0;
                cursor[from.index()] += 1;
            }
        }
        Ok(targets)
    }

    /// A link survives when both endpoints map to snapshot nodes.
    fn resolve(&self, nodes: &NodeTable, row: &LinkRow) -> Option<basin_common::NodeId> {
        let from = nodes.node_for_page(PageId(row.from_page_id))?;
        nodes.node_for_page(PageId(row.to_page_id))?;
        Some(from)
    }
}
