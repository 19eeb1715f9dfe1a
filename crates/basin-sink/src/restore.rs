//! Checkpoint validation and layer restore.
//!
//! On restart the controller skips any N whose artifacts already exist and
//! still carry the expected schema; the multiplex join then needs that
//! layer's assignment back in memory, which is what [`restore_layer`]
//! rebuilds from the `cycles` and `basin_assignments` artifacts.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use arrow::array::{Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use basin_common::{BasinError, BasinResult, PageId};
use basin_engine::HALT_DEPTH;
use basin_multiplex::LayerAssignment;
use basin_snapshot::NodeTable;

use crate::export::{basin_assignments_path, cycles_path, schemas};
use crate::writer::OutputFormat;

/// Whether an existing artifact still matches the expected schema (field
/// names and, for Parquet, field types). A mismatch means the file predates
/// a schema change and must be recomputed.
pub fn schema_matches(path: &Path, expected: &Schema, format: OutputFormat) -> bool {
    match format {
        OutputFormat::Parquet => parquet_schema_matches(path, expected),
        OutputFormat::Tsv => tsv_schema_matches(path, expected),
    }
}

fn parquet_schema_matches(path: &Path, expected: &Schema) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let Ok(builder) = ParquetRecordBatchReaderBuilder::try_new(file) else {
        return false;
    };
    let actual = builder.schema();
    actual.fields().len() == expected.fields().len()
        && actual
            .fields()
            .iter()
            .zip(expected.fields())
            .all(|(a, e)| a.name() == e.name() && a.data_type() == e.data_type())
}

fn tsv_schema_matches(path: &Path, expected: &Schema) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut header = String::new();
    if BufReader::new(file).read_line(&mut header).is_err() {
        return false;
    }
    let names: Vec<&str> = header.trim_end().split('\t').collect();
    names.len() == expected.fields().len()
        && names
            .iter()
            .zip(expected.fields())
            .all(|(n, e)| n == e.name())
}

/// Rebuild a [`LayerAssignment`] from the per-N artifacts on disk.
pub fn restore_layer(
    dir: &Path,
    format: OutputFormat,
    n: u32,
    nodes: &NodeTable,
) -> BasinResult<LayerAssignment> {
    let cycles = read_cycles(&cycles_path(dir, format, n), format, nodes)?;
    let (terminal, depth) =
        read_assignments(&basin_assignments_path(dir, format, n), format, nodes)?;
    LayerAssignment::from_raw(n, nodes.len() as u32, terminal, depth, cycles)
}

fn corrupt(path: &Path, what: impl std::fmt::Display) -> BasinError {
    BasinError::Internal(format!("corrupt artifact '{}': {what}", path.display()))
}

fn node_of(nodes: &NodeTable, page: i64, path: &Path) -> BasinResult<u32> {
    nodes
        .node_for_page(PageId(page))
        .map(|n| n.0)
        .ok_or_else(|| corrupt(path, format!("page {page} not in snapshot")))
}

/// Read (internal cycle id, length), ascending by id.
fn read_cycles(
    path: &Path,
    format: OutputFormat,
    nodes: &NodeTable,
) -> BasinResult<Vec<(u32, u32)>> {
    let mut cycles: Vec<(u32, u32)> = Vec::new();
    let mut push = |cycle_page: i64, length: i32| -> BasinResult<()> {
        let id = node_of(nodes, cycle_page, path)?;
        if cycles.last().map(|&(last, _)| last) != Some(id) {
            cycles.push((id, length as u32));
        }
        Ok(())
    };

    match format {
        OutputFormat::Parquet => {
            for batch in open_parquet(path)? {
                let batch = batch.map_err(|e| corrupt(path, e))?;
                let ids: &Int64Array = col(&batch, 0, path)?;
                let lengths: &Int32Array = col(&batch, 1, path)?;
                for i in 0..batch.num_rows() {
                    push(ids.value(i), lengths.value(i))?;
                }
            }
        }
        OutputFormat::Tsv => {
            for line in tsv_rows(path)? {
                let line = line?;
                let fields: Vec<&str> = line.split('\t').collect();
                if fields.len() < 2 {
                    return Err(corrupt(path, "short cycles row"));
                }
                push(parse(fields[0], path)?, parse(fields[1], path)?)?;
            }
        }
    }
    cycles.sort_unstable_by_key(|&(id, _)| id);
    Ok(cycles)
}

/// Read the per-node terminal/depth arrays back.
fn read_assignments(
    path: &Path,
    format: OutputFormat,
    nodes: &NodeTable,
) -> BasinResult<(Vec<u32>, Vec<u32>)> {
    let halt_code = nodes.len() as u32;
    let mut terminal = vec![halt_code; nodes.len()];
    let mut depth = vec![HALT_DEPTH; nodes.len()];
    let mut seen = 0usize;

    let mut apply = |page: i64, cycle: Option<i64>, d: Option<i32>| -> BasinResult<()> {
        let v = node_of(nodes, page, path)? as usize;
        if let Some(cycle_page) = cycle {
            terminal[v] = node_of(nodes, cycle_page, path)?;
            depth[v] = d.ok_or_else(|| corrupt(path, "cycle row without depth"))? as u32;
        }
        seen += 1;
        Ok(())
    };

    match format {
        OutputFormat::Parquet => {
            for batch in open_parquet(path)? {
                let batch = batch.map_err(|e| corrupt(path, e))?;
                let pages: &Int64Array = col(&batch, 0, path)?;
                let cycles: &Int64Array = col(&batch, 1, path)?;
                let depths: &Int32Array = col(&batch, 2, path)?;
                let _kinds: &StringArray = col(&batch, 3, path)?;
                for i in 0..batch.num_rows() {
                    let cycle = (!cycles.is_null(i)).then(|| cycles.value(i));
                    let d = (!depths.is_null(i)).then(|| depths.value(i));
                    apply(pages.value(i), cycle, d)?;
                }
            }
        }
        OutputFormat::Tsv => {
            for line in tsv_rows(path)? {
                let line = line?;
                let fields: Vec<&str> = line.split('\t').collect();
                if fields.len() < 4 {
                    return Err(corrupt(path, "short assignment row"));
                }
                let cycle = (!fields[1].is_empty())
                    .then(|| parse::<i64>(fields[1], path))
                    .transpose()?;
                let d = (!fields[2].is_empty())
                    .then(|| parse::<i32>(fields[2], path))
                    .transpose()?;
                apply(parse(fields[0], path)?, cycle, d)?;
            }
        }
    }

    if seen != nodes.len() {
        return Err(corrupt(
            path,
            format!("{seen} assignment rows for {} nodes", nodes.len()),
        ));
    }
    Ok((terminal, depth))
}

fn open_parquet(
    path: &Path,
) -> BasinResult<parquet::arrow::arrow_reader::ParquetRecordBatchReader> {
    let file = File::open(path)?;
    ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| corrupt(path, e))?
        .build()
        .map_err(|e| corrupt(path, e))
}

fn col<'a, T: 'static>(batch: &'a RecordBatch, idx: usize, path: &Path) -> BasinResult<&'a T> {
    batch
        .columns()
        .get(idx)
        .ok_or_else(|| corrupt(path, format!("missing column {idx}")))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| corrupt(path, format!("column {idx} has unexpected type")))
}

fn tsv_rows(path: &Path) -> BasinResult<impl Iterator<Item = BasinResult<String>>> {
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();
    lines.next(); // header
    Ok(lines.map(|l| l.map_err(BasinError::from)))
}

fn parse<T: std::str::FromStr>(field: &str, path: &Path) -> BasinResult<T>
where
    T::Err: std::fmt::Display,
{
    field.parse::<T>().map_err(|e| corrupt(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{write_basin_assignments, write_cycles};
    use basin_common::CancelFlag;
    use basin_engine::{classify, SuccessorMap};
    use basin_snapshot::CsrGraph;
    use smol_str::SmolStr;
    use std::path::PathBuf;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("basin_restore_test_{tag}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn five_node_fixture() -> (CsrGraph, NodeTable) {
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
        (graph, nodes)
    }

    fn roundtrip(format: OutputFormat, tag: &str) {
        let dir = temp_dir(tag);
        let (graph, nodes) = five_node_fixture();
        let succ = SuccessorMap::build(&graph, 1);
        let class = classify(&succ, &CancelFlag::new()).unwrap();

        write_cycles(&dir, format, &nodes, &class).unwrap();
        let layer = LayerAssignment::from_classification(class);
        write_basin_assignments(&dir, format, &nodes, &layer).unwrap();

        let restored = restore_layer(&dir, format, 1, &nodes).unwrap();
        assert_eq!(restored.n(), 1);
        assert_eq!(restored.cycles(), layer.cycles());
        for v in 0..5 {
            assert_eq!(restored.terminal(v), layer.terminal(v));
            assert_eq!(restored.depth(v), layer.depth(v));
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn parquet_roundtrip() {
        roundtrip(OutputFormat::Parquet, "parquet");
    }

    #[test]
    fn tsv_roundtrip() {
        roundtrip(OutputFormat::Tsv, "tsv");
    }

    #[test]
    fn schema_check_accepts_fresh_artifacts() {
        let dir = temp_dir("schema_ok");
        let (graph, nodes) = five_node_fixture();
        let succ = SuccessorMap::build(&graph, 2);
        let class = classify(&succ, &CancelFlag::new()).unwrap();
        let path = write_cycles(&dir, OutputFormat::Parquet, &nodes, &class).unwrap();
        assert!(schema_matches(
            &path,
            &schemas::cycles(),
            OutputFormat::Parquet
        ));
        assert!(!schema_matches(
            &path,
            &schemas::basin_assignments(),
            OutputFormat::Parquet
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn schema_check_rejects_missing_file() {
        let dir = temp_dir("schema_missing");
        assert!(!schema_matches(
            &dir.join("nope.parquet"),
            &schemas::cycles(),
            OutputFormat::Parquet
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn restore_detects_missing_rows() {
        let dir = temp_dir("short");
        let (graph, nodes) = five_node_fixture();
        let succ = SuccessorMap::build(&graph, 1);
        let class = classify(&succ, &CancelFlag::new()).unwrap();
        write_cycles(&dir, OutputFormat::Tsv, &nodes, &class).unwrap();
        // Hand-write an assignments file that is missing two rows.
        std::fs::write(
            basin_assignments_path(&dir, OutputFormat::Tsv, 1),
            "page_id\tcycle_id\tdepth\tterminal_kind\n100\t100\t0\tcycle\n110\t100\t0\tcycle\n120\t130\t1\tcycle\n",
        )
        .unwrap();
        let err = restore_layer(&dir, OutputFormat::Tsv, 1, &nodes).unwrap_err();
        assert!(err.to_string().contains("assignment rows"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
