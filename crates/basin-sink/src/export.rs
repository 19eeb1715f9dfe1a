//! Batch export of every artifact, with stable schemas and file names.
//!
//! Internal node ids are remapped to external page ids here and nowhere
//! else. Row order is fixed by explicit sort keys (ascending page id, or the
//! documented ranking for tunnels), so two runs over the same snapshot and
//! plan produce byte-identical tables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use basin_common::{BasinError, BasinResult, NodeId};
use basin_engine::{Basin, BranchDecomposition, Classification};
use basin_multiplex::{
    BasinFlow, Coverage, LayerAssignment, LayerMatrix, MultiplexTable, StabilityScore, TunnelNode,
};
use basin_snapshot::NodeTable;

use crate::writer::{write_table_atomic, OutputFormat};

/// Rows per RecordBatch for the large per-node tables.
const BATCH_ROWS: usize = 1 << 20;

/// Artifact schemas. Field order is part of the contract.
pub mod schemas {
    use super::*;

    pub fn cycles() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("cycle_id", DataType::Int64, false),
            Field::new("length", DataType::Int32, false),
            Field::new("member_page_id", DataType::Int64, false),
            Field::new("member_order", DataType::Int32, false),
        ]))
    }

    pub fn basin_assignments() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("page_id", DataType::Int64, false),
            Field::new("cycle_id", DataType::Int64, true),
            Field::new("depth", DataType::Int32, true),
            Field::new("terminal_kind", DataType::Utf8, false),
        ]))
    }

    pub fn basin_members() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("page_id", DataType::Int64, false),
            Field::new("depth", DataType::Int32, false),
        ]))
    }

    pub fn basin_layers() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("depth", DataType::Int32, false),
            Field::new("count", DataType::Int64, false),
        ]))
    }

    pub fn branches() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("entry_page_id", DataType::Int64, false),
            Field::new("subtree_root_page_id", DataType::Int64, false),
            Field::new("subtree_size", DataType::Int64, false),
            Field::new("rank", DataType::Int32, false),
        ]))
    }

    pub fn multiplex_assignments() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("page_id", DataType::Int64, false),
            Field::new("N", DataType::Int32, false),
            Field::new("cycle_id", DataType::Int64, true),
            Field::new("depth", DataType::Int32, true),
            Field::new("terminal_kind", DataType::Utf8, false),
        ]))
    }

    pub fn tunnel_nodes() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("page_id", DataType::Int64, false),
            Field::new("n_distinct_cycles", DataType::Int32, false),
            Field::new("transitions", DataType::Int32, false),
            Field::new("score", DataType::Float64, false),
            Field::new("type", DataType::Utf8, false),
            Field::new("page_title", DataType::Utf8, false),
        ]))
    }

    pub fn layer_connectivity() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("n_src", DataType::Int32, false),
            Field::new("n_dst", DataType::Int32, false),
            Field::new("same_cycle_count", DataType::Int64, false),
            Field::new("diff_cycle_count", DataType::Int64, false),
        ]))
    }

    pub fn basin_flows() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("from_cycle_id", DataType::Int64, true),
            Field::new("to_cycle_id", DataType::Int64, true),
            Field::new("from_n", DataType::Int32, false),
            Field::new("to_n", DataType::Int32, false),
            Field::new("count", DataType::Int64, false),
        ]))
    }

    pub fn basin_stability() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("cycle_id", DataType::Int64, false),
            Field::new("layers_present", DataType::Int32, false),
            Field::new("total_pages", DataType::Int64, false),
            Field::new("persistence", DataType::Float64, false),
        ]))
    }

    pub fn coverage() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("nodes_covered", DataType::Int64, false),
            Field::new("total_nodes", DataType::Int64, false),
            Field::new("coverage", DataType::Float64, false),
        ]))
    }
}

// ---------------------------------------------------------------------------
// Paths: pure functions of (dir, format, parameters)
// ---------------------------------------------------------------------------

pub fn cycles_path(dir: &Path, format: OutputFormat, n: u32) -> PathBuf {
    dir.join(format!("cycles_n={n}.{}", format.extension()))
}

pub fn basin_assignments_path(dir: &Path, format: OutputFormat, n: u32) -> PathBuf {
    dir.join(format!("basin_assignments_n={n}.{}", format.extension()))
}

pub fn basin_members_path(dir: &Path, format: OutputFormat, n: u32, cycle_page: i64) -> PathBuf {
    dir.join(format!(
        "basin_members_n={n}_cycle={cycle_page}.{}",
        format.extension()
    ))
}

pub fn basin_layers_path(dir: &Path, format: OutputFormat, n: u32, cycle_page: i64) -> PathBuf {
    dir.join(format!(
        "basin_layers_n={n}_cycle={cycle_page}.{}",
        format.extension()
    ))
}

pub fn branches_path(dir: &Path, format: OutputFormat, n: u32, cycle_page: i64) -> PathBuf {
    dir.join(format!(
        "branches_n={n}_cycle={cycle_page}.{}",
        format.extension()
    ))
}

pub fn multiplex_assignments_path(dir: &Path, format: OutputFormat) -> PathBuf {
    dir.join(format!(
        "multiplex_basin_assignments.{}",
        format.extension()
    ))
}

pub fn tunnel_nodes_path(dir: &Path, format: OutputFormat) -> PathBuf {
    dir.join(format!("tunnel_nodes.{}", format.extension()))
}

pub fn layer_connectivity_path(dir: &Path, format: OutputFormat) -> PathBuf {
    dir.join(format!("layer_connectivity.{}", format.extension()))
}

pub fn basin_flows_path(dir: &Path, format: OutputFormat) -> PathBuf {
    dir.join(format!("basin_flows.{}", format.extension()))
}

pub fn basin_stability_path(dir: &Path, format: OutputFormat) -> PathBuf {
    dir.join(format!("basin_stability.{}", format.extension()))
}

pub fn coverage_path(dir: &Path, format: OutputFormat) -> PathBuf {
    dir.join(format!("hyperstructure_coverage.{}", format.extension()))
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

fn batch(schema: &Arc<Schema>, columns: Vec<ArrayRef>) -> BasinResult<RecordBatch> {
    RecordBatch::try_new(Arc::clone(schema), columns)
        .map_err(|e| BasinError::Internal(format!("cannot assemble record batch: {e}")))
}

/// Attach a `truncated=true` marker as schema metadata (Parquet only; TSV
/// carries the marker in the structured log).
fn mark_truncated(schema: &Arc<Schema>, truncated: bool) -> Arc<Schema> {
    if !truncated {
        return Arc::clone(schema);
    }
    let metadata: HashMap<String, String> =
        [("truncated".to_string(), "true".to_string())].into();
    Arc::new(schema.as_ref().clone().with_metadata(metadata))
}

/// One row per cycle member, cycles ascending by id, members in orbit order.
pub fn write_cycles(
    dir: &Path,
    format: OutputFormat,
    nodes: &NodeTable,
    class: &Classification,
) -> BasinResult<PathBuf> {
    let mut cycle_ids = Vec::new();
    let mut lengths = Vec::new();
    let mut member_pages = Vec::new();
    let mut orders = Vec::new();
    for cycle in class.cycles().iter() {
        let cid = nodes.page_for_node(cycle.id.node()).0;
        for (order, &member) in cycle.members.iter().enumerate() {
            cycle_ids.push(cid);
            lengths.push(cycle.len() as i32);
            member_pages.push(nodes.page_for_node(member).0);
            orders.push(order as i32);
        }
    }

    let schema = schemas::cycles();
    let b = batch(
        &schema,
        vec![
            Arc::new(Int64Array::from(cycle_ids)),
            Arc::new(Int32Array::from(lengths)),
            Arc::new(Int64Array::from(member_pages)),
            Arc::new(Int32Array::from(orders)),
        ],
    )?;
    let path = cycles_path(dir, format, class.n());
    write_table_atomic(&path, &schema, &[b], format)?;
    Ok(path)
}

/// Per-node terminal classification at one N, ascending by page id.
pub fn write_basin_assignments(
    dir: &Path,
    format: OutputFormat,
    nodes: &NodeTable,
    layer: &LayerAssignment,
) -> BasinResult<PathBuf> {
    let schema = schemas::basin_assignments();
    let mut batches = Vec::new();

    let mut page_ids: Vec<i64> = Vec::with_capacity(BATCH_ROWS);
    let mut cycle_ids: Vec<Option<i64>> = Vec::with_capacity(BATCH_ROWS);
    let mut depths: Vec<Option<i32>> = Vec::with_capacity(BATCH_ROWS);
    let mut kinds: Vec<&str> = Vec::with_capacity(BATCH_ROWS);

    for v in 0..layer.num_nodes() {
        page_ids.push(nodes.page_for_node(NodeId(v)).0);
        match layer.terminal(v) {
            Some(cycle) => {
                cycle_ids.push(Some(nodes.page_for_node(NodeId(cycle)).0));
                depths.push(layer.depth(v).map(|d| d as i32));
                kinds.push("cycle");
            }
            None => {
                cycle_ids.push(None);
                depths.push(None);
                kinds.push("halt");
            }
        }
        if page_ids.len() == BATCH_ROWS {
            batches.push(assignments_batch(
                &schema,
                &mut page_ids,
                &mut cycle_ids,
                &mut depths,
                &mut kinds,
            )?);
        }
    }
    if !page_ids.is_empty() || batches.is_empty() {
        batches.push(assignments_batch(
            &schema,
            &mut page_ids,
            &mut cycle_ids,
            &mut depths,
            &mut kinds,
        )?);
    }

    let path = basin_assignments_path(dir, format, layer.n());
    write_table_atomic(&path, &schema, &batches, format)?;
    Ok(path)
}

fn assignments_batch(
    schema: &Arc<Schema>,
    page_ids: &mut Vec<i64>,
    cycle_ids: &mut Vec<Option<i64>>,
    depths: &mut Vec<Option<i32>>,
    kinds: &mut Vec<&str>,
) -> BasinResult<RecordBatch> {
    batch(
        schema,
        vec![
            Arc::new(Int64Array::from(std::mem::take(page_ids))),
            Arc::new(Int64Array::from(std::mem::take(cycle_ids))),
            Arc::new(Int32Array::from(std::mem::take(depths))),
            Arc::new(StringArray::from(std::mem::take(kinds))),
        ],
    )
}

/// Basin members with depths, ascending by page id.
pub fn write_basin_members(
    dir: &Path,
    format: OutputFormat,
    nodes: &NodeTable,
    n: u32,
    basin: &Basin,
) -> BasinResult<PathBuf> {
    let schema = mark_truncated(&schemas::basin_members(), basin.truncated);

    let mut sorted: Vec<(u32, u32)> = basin.members.clone();
    sorted.sort_unstable_by_key(|&(node, _)| node);

    let mut batches = Vec::new();
    for chunk in sorted.chunks(BATCH_ROWS) {
        let page_ids: Vec<i64> = chunk
            .iter()
            .map(|&(node, _)| nodes.page_for_node(NodeId(node)).0)
            .collect();
        let depths: Vec<i32> = chunk.iter().map(|&(_, d)| d as i32).collect();
        batches.push(batch(
            &schema,
            vec![
                Arc::new(Int64Array::from(page_ids)),
                Arc::new(Int32Array::from(depths)),
            ],
        )?);
    }
    if batches.is_empty() {
        batches.push(batch(
            &schema,
            vec![
                Arc::new(Int64Array::from(Vec::<i64>::new())),
                Arc::new(Int32Array::from(Vec::<i32>::new())),
            ],
        )?);
    }

    let cycle_page = nodes.page_for_node(basin.cycle_id.node()).0;
    let path = basin_members_path(dir, format, n, cycle_page);
    write_table_atomic(&path, &schema, &batches, format)?;
    Ok(path)
}

/// Depth-stratified member counts for one basin.
pub fn write_basin_layers(
    dir: &Path,
    format: OutputFormat,
    nodes: &NodeTable,
    n: u32,
    basin: &Basin,
) -> BasinResult<PathBuf> {
    let schema = mark_truncated(&schemas::basin_layers(), basin.truncated);
    let depths: Vec<i32> = (0..basin.layers.len() as i32).collect();
    let counts: Vec<i64> = basin.layers.iter().map(|&c| c as i64).collect();
    let b = batch(
        &schema,
        vec![
            Arc::new(Int32Array::from(depths)),
            Arc::new(Int64Array::from(counts)),
        ],
    )?;
    let cycle_page = nodes.page_for_node(basin.cycle_id.node()).0;
    let path = basin_layers_path(dir, format, n, cycle_page);
    write_table_atomic(&path, &schema, &[b], format)?;
    Ok(path)
}

/// Trunkiness rows for every decomposed entry of one cycle. Entries are
/// ordered by page id, subtrees by rank (1 = largest).
pub fn write_branches(
    dir: &Path,
    format: OutputFormat,
    nodes: &NodeTable,
    n: u32,
    cycle_page: i64,
    decompositions: &[BranchDecomposition],
) -> BasinResult<PathBuf> {
    let mut order: Vec<&BranchDecomposition> = decompositions.iter().collect();
    order.sort_by_key(|d| d.entry);

    let mut entry_pages = Vec::new();
    let mut root_pages = Vec::new();
    let mut sizes = Vec::new();
    let mut ranks = Vec::new();
    for d in order {
        let entry_page = nodes.page_for_node(d.entry).0;
        for (i, subtree) in d.subtrees.iter().enumerate() {
            entry_pages.push(entry_page);
            root_pages.push(nodes.page_for_node(subtree.root).0);
            sizes.push(subtree.size as i64);
            ranks.push(i as i32 + 1);
        }
    }

    let schema = schemas::branches();
    let b = batch(
        &schema,
        vec![
            Arc::new(Int64Array::from(entry_pages)),
            Arc::new(Int64Array::from(root_pages)),
            Arc::new(Int64Array::from(sizes)),
            Arc::new(Int32Array::from(ranks)),
        ],
    )?;
    let path = branches_path(dir, format, n, cycle_page);
    write_table_atomic(&path, &schema, &[b], format)?;
    Ok(path)
}

/// The long (page, N) table, ordered by page id then N.
pub fn write_multiplex_assignments(
    dir: &Path,
    format: OutputFormat,
    nodes: &NodeTable,
    table: &MultiplexTable,
) -> BasinResult<PathBuf> {
    let schema = schemas::multiplex_assignments();
    let mut batches = Vec::new();

    let mut page_ids: Vec<i64> = Vec::with_capacity(BATCH_ROWS);
    let mut ns: Vec<i32> = Vec::with_capacity(BATCH_ROWS);
    let mut cycle_ids: Vec<Option<i64>> = Vec::with_capacity(BATCH_ROWS);
    let mut depths: Vec<Option<i32>> = Vec::with_capacity(BATCH_ROWS);
    let mut kinds: Vec<&str> = Vec::with_capacity(BATCH_ROWS);

    for v in 0..table.num_nodes() {
        let page = nodes.page_for_node(NodeId(v)).0;
        for layer in table.layers() {
            page_ids.push(page);
            ns.push(layer.n() as i32);
            match layer.terminal(v) {
                Some(cycle) => {
                    cycle_ids.push(Some(nodes.page_for_node(NodeId(cycle)).0));
                    depths.push(layer.depth(v).map(|d| d as i32));
                    kinds.push("cycle");
                }
                None => {
                    cycle_ids.push(None);
                    depths.push(None);
                    kinds.push("halt");
                }
            }
            if page_ids.len() == BATCH_ROWS {
                batches.push(multiplex_batch(
                    &schema,
                    &mut page_ids,
                    &mut ns,
                    &mut cycle_ids,
                    &mut depths,
                    &mut kinds,
                )?);
            }
        }
    }
    if !page_ids.is_empty() || batches.is_empty() {
        batches.push(multiplex_batch(
            &schema,
            &mut page_ids,
            &mut ns,
            &mut cycle_ids,
            &mut depths,
            &mut kinds,
        )?);
    }

    let path = multiplex_assignments_path(dir, format);
    write_table_atomic(&path, &schema, &batches, format)?;
    Ok(path)
}

fn multiplex_batch(
    schema: &Arc<Schema>,
    page_ids: &mut Vec<i64>,
    ns: &mut Vec<i32>,
    cycle_ids: &mut Vec<Option<i64>>,
    depths: &mut Vec<Option<i32>>,
    kinds: &mut Vec<&str>,
) -> BasinResult<RecordBatch> {
    batch(
        schema,
        vec![
            Arc::new(Int64Array::from(std::mem::take(page_ids))),
            Arc::new(Int32Array::from(std::mem::take(ns))),
            Arc::new(Int64Array::from(std::mem::take(cycle_ids))),
            Arc::new(Int32Array::from(std::mem::take(depths))),
            Arc::new(StringArray::from(std::mem::take(kinds))),
        ],
    )
}

/// Ranked tunnel table, descending by score.
pub fn write_tunnel_nodes(
    dir: &Path,
    format: OutputFormat,
    nodes: &NodeTable,
    tunnels: &[TunnelNode],
) -> BasinResult<PathBuf> {
    let page_ids: Vec<i64> = tunnels
        .iter()
        .map(|t| nodes.page_for_node(NodeId(t.node)).0)
        .collect();
    let distinct: Vec<i32> = tunnels.iter().map(|t| t.n_distinct_cycles as i32).collect();
    let transitions: Vec<i32> = tunnels.iter().map(|t| t.transitions as i32).collect();
    let scores: Vec<f64> = tunnels.iter().map(|t| t.score).collect();
    let kinds: Vec<&str> = tunnels.iter().map(|t| t.kind.as_str()).collect();
    let titles: Vec<&str> = tunnels
        .iter()
        .map(|t| nodes.title(NodeId(t.node)))
        .collect();

    let schema = schemas::tunnel_nodes();
    let b = batch(
        &schema,
        vec![
            Arc::new(Int64Array::from(page_ids)),
            Arc::new(Int32Array::from(distinct)),
            Arc::new(Int32Array::from(transitions)),
            Arc::new(Float64Array::from(scores)),
            Arc::new(StringArray::from(kinds)),
            Arc::new(StringArray::from(titles)),
        ],
    )?;
    let path = tunnel_nodes_path(dir, format);
    write_table_atomic(&path, &schema, &[b], format)?;
    Ok(path)
}

/// N×N same/different-cycle totals, row-major over ascending N.
pub fn write_layer_connectivity(
    dir: &Path,
    format: OutputFormat,
    matrix: &LayerMatrix,
) -> BasinResult<PathBuf> {
    let mut n_src = Vec::new();
    let mut n_dst = Vec::new();
    let mut same = Vec::new();
    let mut diff = Vec::new();
    for (src, dst, s, d) in matrix.entries() {
        n_src.push(src as i32);
        n_dst.push(dst as i32);
        same.push(s as i64);
        diff.push(d as i64);
    }

    let schema = schemas::layer_connectivity();
    let b = batch(
        &schema,
        vec![
            Arc::new(Int32Array::from(n_src)),
            Arc::new(Int32Array::from(n_dst)),
            Arc::new(Int64Array::from(same)),
            Arc::new(Int64Array::from(diff)),
        ],
    )?;
    let path = layer_connectivity_path(dir, format);
    write_table_atomic(&path, &schema, &[b], format)?;
    Ok(path)
}

/// Cross-N page flows between cycle identities.
pub fn write_basin_flows(
    dir: &Path,
    format: OutputFormat,
    nodes: &NodeTable,
    flows: &[BasinFlow],
) -> BasinResult<PathBuf> {
    let cycle_page =
        |c: Option<u32>| -> Option<i64> { c.map(|id| nodes.page_for_node(NodeId(id)).0) };
    let from: Vec<Option<i64>> = flows.iter().map(|f| cycle_page(f.from_cycle)).collect();
    let to: Vec<Option<i64>> = flows.iter().map(|f| cycle_page(f.to_cycle)).collect();
    let from_n: Vec<i32> = flows.iter().map(|f| f.from_n as i32).collect();
    let to_n: Vec<i32> = flows.iter().map(|f| f.to_n as i32).collect();
    let counts: Vec<i64> = flows.iter().map(|f| f.count as i64).collect();

    let schema = schemas::basin_flows();
    let b = batch(
        &schema,
        vec![
            Arc::new(Int64Array::from(from)),
            Arc::new(Int64Array::from(to)),
            Arc::new(Int32Array::from(from_n)),
            Arc::new(Int32Array::from(to_n)),
            Arc::new(Int64Array::from(counts)),
        ],
    )?;
    let path = basin_flows_path(dir, format);
    write_table_atomic(&path, &schema, &[b], format)?;
    Ok(path)
}

/// Per-cycle persistence across the configured layers.
pub fn write_basin_stability(
    dir: &Path,
    format: OutputFormat,
    nodes: &NodeTable,
    scores: &[StabilityScore],
) -> BasinResult<PathBuf> {
    let cycle_ids: Vec<i64> = scores
        .iter()
        .map(|s| nodes.page_for_node(NodeId(s.cycle_id)).0)
        .collect();
    let layers: Vec<i32> = scores.iter().map(|s| s.layers_present as i32).collect();
    let totals: Vec<i64> = scores.iter().map(|s| s.total_pages as i64).collect();
    let persistence: Vec<f64> = scores.iter().map(|s| s.persistence).collect();

    let schema = schemas::basin_stability();
    let b = batch(
        &schema,
        vec![
            Arc::new(Int64Array::from(cycle_ids)),
            Arc::new(Int32Array::from(layers)),
            Arc::new(Int64Array::from(totals)),
            Arc::new(Float64Array::from(persistence)),
        ],
    )?;
    let path = basin_stability_path(dir, format);
    write_table_atomic(&path, &schema, &[b], format)?;
    Ok(path)
}

/// One-row hyperstructure coverage summary.
pub fn write_coverage(
    dir: &Path,
    format: OutputFormat,
    coverage: &Coverage,
) -> BasinResult<PathBuf> {
    let schema = schemas::coverage();
    let b = batch(
        &schema,
        vec![
            Arc::new(Int64Array::from(vec![coverage.covered as i64])),
            Arc::new(Int64Array::from(vec![coverage.total as i64])),
            Arc::new(Float64Array::from(vec![coverage.fraction()])),
        ],
    )?;
    let path = coverage_path(dir, format);
    write_table_atomic(&path, &schema, &[b], format)?;
    Ok(path)
}
