//! The `VoteStore` trait: the seam between pipeline logic and the engine.
//!
//! Implemented by storage backends (e.g. `tally-store-sqlite`). Every method
//! that mutates state is expected to be atomic on its own.

use crate::{
  outlier::OutlierWeek,
  schema::{Column, TableRef},
  vote::VoteRecord,
};

pub trait VoteStore {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── DDL ───────────────────────────────────────────────────────────────

  /// Create the namespace if it does not exist yet.
  fn ensure_namespace(&mut self, namespace: &str) -> Result<(), Self::Error>;

  fn create_table_if_absent(
    &mut self,
    table:   &TableRef,
    columns: &[Column],
  ) -> Result<(), Self::Error>;

  /// Column names of `table`, in declaration order.
  fn column_names(&self, table: &TableRef) -> Result<Vec<String>, Self::Error>;

  /// Whether `table` exists. Must not create its namespace as a side effect.
  fn table_exists(&mut self, table: &TableRef) -> Result<bool, Self::Error>;

  /// Returns `true` if a table was actually dropped.
  fn drop_table_if_exists(&mut self, table: &TableRef) -> Result<bool, Self::Error>;

  // ── Rows ──────────────────────────────────────────────────────────────

  fn count_rows(&self, table: &TableRef) -> Result<u64, Self::Error>;

  /// Insert every record in a single transaction: all rows or none.
  fn append(
    &mut self,
    table:   &TableRef,
    records: &[VoteRecord],
  ) -> Result<usize, Self::Error>;

  /// Rewrite `table` as its distinct row set: fill [`TableRef::staging`]
  /// with `SELECT DISTINCT *`, drop `table`, rename staging into place.
  fn swap_distinct(
    &mut self,
    table:   &TableRef,
    columns: &[Column],
  ) -> Result<(), Self::Error>;

  // ── Views ─────────────────────────────────────────────────────────────

  /// Atomically (re)define `view` as the outlier-week query over `source`.
  fn replace_outlier_view(
    &mut self,
    source:    &TableRef,
    view:      &TableRef,
    threshold: f64,
  ) -> Result<(), Self::Error>;

  /// Returns `true` if a view was actually dropped.
  fn drop_view_if_exists(&mut self, view: &TableRef) -> Result<bool, Self::Error>;

  /// Rows of an outlier view ordered by `(year_number, week_number)`.
  fn outlier_weeks(&self, view: &TableRef) -> Result<Vec<OutlierWeek>, Self::Error>;
}
