//! The ingest pipeline: validate-and-load, then deduplicate.
//!
//! The whole source file is validated before anything is written, so a
//! single bad record leaves the table untouched.

use std::{
  fs::File,
  io::{BufRead, BufReader},
  path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::{
  error::{IngestError, RecordError},
  schema::{TableRef, VOTE_COLUMNS},
  store::VoteStore,
  vote::{VoteRecord, parse_line},
};

/// Outcome of one successful ingest call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
  pub source:      PathBuf,
  /// Non-blank lines read from the source, all of which passed validation.
  pub rows_read:   usize,
  /// Distinct rows in the table before this batch.
  pub rows_before: u64,
  /// Distinct rows in the table after insert and dedup.
  pub rows_after:  u64,
}

impl IngestSummary {
  /// Rows this batch contributed that were not already present.
  pub fn rows_added(&self) -> u64 { self.rows_after.saturating_sub(self.rows_before) }
}

/// Read and validate every record of a newline-delimited JSON file.
///
/// Blank lines are skipped. The first invalid record fails the whole batch
/// with its 1-based line number.
pub fn read_batch(path: &Path) -> Result<Vec<VoteRecord>, IngestError> {
  let io_err = |source| IngestError::Io { path: path.to_path_buf(), source };

  let mut reader = BufReader::new(File::open(path).map_err(io_err)?);
  let mut records = Vec::new();
  let mut buf = Vec::new();
  let mut line_no = 0;

  loop {
    buf.clear();
    if reader.read_until(b'\n', &mut buf).map_err(io_err)? == 0 {
      break;
    }
    line_no += 1;

    let rejected = |source| IngestError::Validation { line: line_no, source };
    let line = std::str::from_utf8(&buf)
      .map_err(|e| rejected(RecordError::Malformed(format!("invalid UTF-8: {e}"))))?;
    if line.trim().is_empty() {
      continue;
    }
    records.push(parse_line(line).map_err(rejected)?);
  }

  Ok(records)
}

/// Load `source` into `table` and rewrite the table as its distinct row set.
///
/// The table must already exist (see [`ensure_schema`](crate::schema::ensure_schema)).
/// Re-ingesting the same file leaves the row count unchanged.
pub fn ingest<S: VoteStore>(
  store:  &mut S,
  table:  &TableRef,
  source: &Path,
) -> Result<IngestSummary, IngestError> {
  let records = read_batch(source)?;
  debug!(source = %source.display(), rows = records.len(), "batch validated");

  let rows_before = store
    .count_rows(table)
    .map_err(|e| IngestError::Storage(Box::new(e)))?;

  let inserted = store
    .append(table, &records)
    .map_err(|e| IngestError::Storage(Box::new(e)))?;
  debug!(%table, inserted, "batch inserted");

  store
    .swap_distinct(table, &VOTE_COLUMNS)
    .map_err(|e| IngestError::Storage(Box::new(e)))?;

  let rows_after = store
    .count_rows(table)
    .map_err(|e| IngestError::Storage(Box::new(e)))?;

  let summary = IngestSummary {
    source: source.to_path_buf(),
    rows_read: records.len(),
    rows_before,
    rows_after,
  };
  info!(
    %table,
    rows_read = summary.rows_read,
    rows_added = summary.rows_added(),
    rows_total = summary.rows_after,
    "ingest complete"
  );
  Ok(summary)
}
