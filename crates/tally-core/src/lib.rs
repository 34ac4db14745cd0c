//! Core types and pipeline logic for the tally vote warehouse.
//!
//! This crate has no database dependency. The three batch operations
//! ([`ensure_schema`], [`ingest`], [`build_outlier_view`]) are written against
//! the [`VoteStore`] trait, which storage backends implement.

pub mod error;
pub mod ingest;
pub mod outlier;
pub mod schema;
pub mod store;
pub mod vote;

pub use error::{IngestError, RecordError, SchemaError, StorageError, ViewError};
pub use ingest::{IngestSummary, ingest};
pub use outlier::{DEVIATION_THRESHOLD, OutlierWeek, build_outlier_view};
pub use schema::{Column, ColumnType, TableRef, VOTE_COLUMNS, ensure_schema};
pub use store::VoteStore;
pub use vote::VoteRecord;
