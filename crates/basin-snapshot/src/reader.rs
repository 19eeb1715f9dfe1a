//! Streaming readers for the two input tables.
//!
//! Both tables are accepted as Parquet or TSV, auto-detected by extension.
//! Parquet batches are decoded one at a time; TSV is read line by line. The
//! loader makes two passes over `nlink_sequences`, so readers are cheap to
//! reopen.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use arrow::array::{Array, BooleanArray, Int32Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};

use basin_common::{BasinError, BasinResult};
use smol_str::SmolStr;

/// One row of the `pages` table.
#[derive(Clone, Debug, PartialEq)]
pub struct PageRow {
    pub page_id: i64,
    pub title: SmolStr,
    pub namespace: i32,
    pub is_redirect: bool,
}

/// One row of the `nlink_sequences` table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkRow {
    pub from_page_id: i64,
    pub position: i32,
    pub to_page_id: i64,
}

/// Open a `pages` reader for the given path, auto-detecting format by
/// extension (`.parquet`, otherwise TSV).
pub fn open_pages_reader(
    path: &Path,
) -> BasinResult<Box<dyn Iterator<Item = BasinResult<PageRow>> + Send>> {
    if is_parquet(path) {
        Ok(Box::new(ParquetPagesReader::open(path)?))
    } else {
        Ok(Box::new(TsvPagesReader::open(path)?))
    }
}

/// Open an `nlink_sequences` reader for the given path.
pub fn open_links_reader(
    path: &Path,
) -> BasinResult<Box<dyn Iterator<Item = BasinResult<LinkRow>> + Send>> {
    if is_parquet(path) {
        Ok(Box::new(ParquetLinksReader::open(path)?))
    } else {
        Ok(Box::new(TsvLinksReader::open(path)?))
    }
}

fn is_parquet(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("parquet"))
        .unwrap_or(false)
}

fn open_batch_reader(path: &Path) -> BasinResult<ParquetRecordBatchReader> {
    let file = File::open(path)
        .map_err(|e| BasinError::BadSnapshot(format!("cannot open '{}': {e}", path.display())))?;
    ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| {
            BasinError::BadSnapshot(format!("invalid Parquet file '{}': {e}", path.display()))
        })?
        .build()
        .map_err(|e| {
            BasinError::BadSnapshot(format!("cannot read Parquet '{}': {e}", path.display()))
        })
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> BasinResult<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| BasinError::BadSnapshot(format!("missing column '{name}'")))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| BasinError::BadSnapshot(format!("column '{name}' has unexpected type")))
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

struct ParquetPagesReader {
    reader: ParquetRecordBatchReader,
    pending: std::vec::IntoIter<PageRow>,
}

impl ParquetPagesReader {
    fn open(path: &Path) -> BasinResult<Self> {
        Ok(Self {
            reader: open_batch_reader(path)?,
            pending: Vec::new().into_iter(),
        })
    }

    fn decode(batch: &RecordBatch) -> BasinResult<Vec<PageRow>> {
        let page_ids: &Int64Array = column(batch, "page_id")?;
        let titles: &StringArray = column(batch, "title")?;
        let namespaces: &Int32Array = column(batch, "namespace")?;
        let redirects: &BooleanArray = column(batch, "is_redirect")?;

        let mut rows = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            if page_ids.is_null(i) {
                return Err(BasinError::BadSnapshot("null page_id in pages".into()));
            }
            rows.push(PageRow {
                page_id: page_ids.value(i),
                title: SmolStr::new(titles.value(i)),
                namespace: namespaces.value(i),
                is_redirect: redirects.value(i),
            });
        }
        Ok(rows)
    }
}

impl Iterator for ParquetPagesReader {
    type Item = BasinResult<PageRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.next() {
                return Some(Ok(row));
            }
            match self.reader.next()? {
                Ok(batch) => match Self::decode(&batch) {
                    Ok(rows) => self.pending = rows.into_iter(),
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => {
                    return Some(Err(BasinError::BadSnapshot(format!(
                        "pages batch error: {e}"
                    ))))
                }
            }
        }
    }
}

struct ParquetLinksReader {
    reader: ParquetRecordBatchReader,
    pending: std::vec::IntoIter<LinkRow>,
}

impl ParquetLinksReader {
    fn open(path: &Path) -> BasinResult<Self> {
        Ok(Self {
            reader: open_batch_reader(path)?,
            pending: Vec::new().into_iter(),
        })
    }

    fn decode(batch: &RecordBatch) -> BasinResult<Vec<LinkRow>> {
        let from: &Int64Array = column(batch, "from_page_id")?;
        let position: &Int32Array = column(batch, "position")?;
        let to: &Int64Array = column(batch, "to_page_id")?;

        let mut rows = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            if from.is_null(i) || position.is_null(i) || to.is_null(i) {
                return Err(BasinError::BadSnapshot("null value in nlink_sequences".into()));
            }
            rows.push(LinkRow {
                from_page_id: from.value(i),
                position: position.value(i),
                to_page_id: to.value(i),
            });
        }
        Ok(rows)
    }
}

impl Iterator for ParquetLinksReader {
    type Item = BasinResult<LinkRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.next() {
                return Some(Ok(row));
            }
            match self.reader.next()? {
                Ok(batch) => match Self::decode(&batch) {
                    Ok(rows) => self.pending = rows.into_iter(),
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => {
                    return Some(Err(BasinError::BadSnapshot(format!(
                        "nlink_sequences batch error: {e}"
                    ))))
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TSV
// ---------------------------------------------------------------------------

/// Locate required column names in a TSV header line.
fn header_indices(header: &str, wanted: &[&str], path: &Path) -> BasinResult<Vec<usize>> {
    let names: Vec<&str> = header.trim_end().split('\t').collect();
    wanted
        .iter()
        .map(|w| {
            names.iter().position(|n| n == w).ok_or_else(|| {
                BasinError::BadSnapshot(format!(
                    "missing column '{w}' in '{}'",
                    path.display()
                ))
            })
        })
        .collect()
}

fn open_lines(path: &Path) -> BasinResult<Lines<BufReader<File>>> {
    let file = File::open(path)
        .map_err(|e| BasinError::BadSnapshot(format!("cannot open '{}': {e}", path.display())))?;
    Ok(BufReader::new(file).lines())
}

fn parse_i64(field: &str, name: &str) -> BasinResult<i64> {
    field
        .parse::<i64>()
        .map_err(|e| BasinError::BadSnapshot(format!("cannot parse '{field}' as {name}: {e}")))
}

fn parse_i32(field: &str, name: &str) -> BasinResult<i32> {
    field
        .parse::<i32>()
        .map_err(|e| BasinError::BadSnapshot(format!("cannot parse '{field}' as {name}: {e}")))
}

fn parse_bool(field: &str) -> BasinResult<bool> {
    match field.to_lowercase().as_str() {
        "true" | "1" | "t" | "yes" => Ok(true),
        "false" | "0" | "f" | "no" => Ok(false),
        _ => Err(BasinError::BadSnapshot(format!(
            "cannot parse '{field}' as BOOL"
        ))),
    }
}

struct TsvPagesReader {
    lines: Lines<BufReader<File>>,
    // column indices: page_id, title, namespace, is_redirect
    cols: [usize; 4],
}

impl TsvPagesReader {
    fn open(path: &Path) -> BasinResult<Self> {
        let mut lines = open_lines(path)?;
        let header = match lines.next() {
            Some(Ok(h)) => h,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(BasinError::BadSnapshot("empty pages file".into())),
        };
        let idx = header_indices(&header, &["page_id", "title", "namespace", "is_redirect"], path)?;
        Ok(Self {
            lines,
            cols: [idx[0], idx[1], idx[2], idx[3]],
        })
    }

    fn parse_line(&self, line: &str) -> BasinResult<PageRow> {
        let fields: Vec<&str> = line.split('\t').collect();
        let field = |i: usize| -> BasinResult<&str> {
            fields
                .get(i)
                .copied()
                .ok_or_else(|| BasinError::BadSnapshot(format!("short row in pages: '{line}'")))
        };
        Ok(PageRow {
            page_id: parse_i64(field(self.cols[0])?, "page_id")?,
            title: SmolStr::new(field(self.cols[1])?),
            namespace: parse_i32(field(self.cols[2])?, "namespace")?,
            is_redirect: parse_bool(field(self.cols[3])?)?,
        })
    }
}

impl Iterator for TsvPagesReader {
    type Item = BasinResult<PageRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) => {
                    if line.is_empty() {
                        continue;
                    }
                    return Some(self.parse_line(&line));
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

struct TsvLinksReader {
    lines: Lines<BufReader<File>>,
    // column indices: from_page_id, position, to_page_id
    cols: [usize; 3],
}

impl TsvLinksReader {
    fn open(path: &Path) -> BasinResult<Self> {
        let mut lines = open_lines(path)?;
        let header = match lines.next() {
            Some(Ok(h)) => h,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(BasinError::BadSnapshot("empty nlink_sequences file".into())),
        };
        let idx = header_indices(&header, &["from_page_id", "position", "to_page_id"], path)?;
        Ok(Self {
            lines,
            cols: [idx[0], idx[1], idx[2]],
        })
    }

    fn parse_line(&self, line: &str) -> BasinResult<LinkRow> {
        let fields: Vec<&str> = line.split('\t').collect();
        let field = |i: usize| -> BasinResult<&str> {
            fields.get(i).copied().ok_or_else(|| {
                BasinError::BadSnapshot(format!("short row in nlink_sequences: '{line}'"))
            })
        };
        Ok(LinkRow {
            from_page_id: parse_i64(field(self.cols[0])?, "from_page_id")?,
            position: parse_i32(field(self.cols[1])?, "position")?,
            to_page_id: parse_i64(field(self.cols[2])?, "to_page_id")?,
        })
    }
}

impl Iterator for TsvLinksReader {
    type Item = BasinResult<LinkRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) => {
                    if line.is_empty() {
                        continue;
                    }
                    return Some(self.parse_line(&line));
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
