//! Error types for `tally-core`.
//!
//! Storage causes are boxed so this crate stays independent of any engine.

use std::path::PathBuf;

use thiserror::Error;

/// An opaque error raised by a [`VoteStore`](crate::store::VoteStore) backend.
pub type StorageError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a single source record could not be projected onto the vote schema.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
  #[error("malformed JSON record: {0}")]
  Malformed(String),

  #[error("required field {0:?} is missing or null")]
  Missing(&'static str),

  #[error("field {field:?} has unsupported JSON type {found}")]
  WrongType {
    field: &'static str,
    found: &'static str,
  },

  #[error("field {field:?} is not a recognised timestamp: {value:?}")]
  InvalidTimestamp { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum SchemaError {
  #[error("invalid identifier: {0:?}")]
  InvalidIdentifier(String),

  /// The table exists but its columns differ from the expected definition.
  #[error("table {table} has columns {found:?}, expected {expected:?}")]
  ShapeMismatch {
    table:    String,
    expected: Vec<String>,
    found:    Vec<String>,
  },

  #[error("storage error while ensuring schema: {0}")]
  Storage(#[source] StorageError),
}

#[derive(Debug, Error)]
pub enum IngestError {
  #[error("cannot read {path}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The batch was rejected; nothing from it was persisted.
  #[error("batch rejected at line {line}: {source}")]
  Validation {
    line:   usize,
    #[source]
    source: RecordError,
  },

  #[error(transparent)]
  Schema(#[from] SchemaError),

  #[error("storage error during ingest: {0}")]
  Storage(#[source] StorageError),
}

impl IngestError {
  /// Validation failures are recoverable by retrying with corrected data.
  pub fn is_rejection(&self) -> bool { matches!(self, Self::Validation { .. }) }
}

#[derive(Debug, Error)]
pub enum ViewError {
  #[error("cannot build a view over empty table {table}")]
  EmptyBase { table: String },

  /// The base table has never been created; nothing has been ingested yet.
  #[error("table {table} does not exist; ingest a batch first")]
  MissingBase { table: String },

  #[error(transparent)]
  Schema(#[from] SchemaError),

  #[error("storage error while building view: {0}")]
  Storage(#[source] StorageError),
}
