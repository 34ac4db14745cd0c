//! The outlier-week view builder.
//!
//! Votes are bucketed by (calendar year, ISO week) of `CreationDate`. A week
//! is an outlier when its count differs from the average weekly count by
//! more than [`DEVIATION_THRESHOLD`] in relative terms.

use tracing::{info, warn};

use crate::{
  error::ViewError,
  schema::TableRef,
  store::VoteStore,
};

/// Relative deviation from the average weekly count above which a week is
/// flagged.
pub const DEVIATION_THRESHOLD: f64 = 0.2;

/// One row of the outlier view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OutlierWeek {
  pub year_number:     i64,
  pub week_number:     i64,
  pub week_vote_count: i64,
}

/// `|1 - count / average|`.
pub fn deviation(week_vote_count: i64, avg_votes_per_week: f64) -> f64 {
  (1.0 - week_vote_count as f64 / avg_votes_per_week).abs()
}

/// In-memory form of the view query over already-bucketed weekly counts.
pub fn select_outliers(weeks: &[OutlierWeek]) -> Vec<OutlierWeek> {
  if weeks.is_empty() {
    return Vec::new();
  }
  let total_votes: i64 = weeks.iter().map(|w| w.week_vote_count).sum();
  let avg = total_votes as f64 / weeks.len() as f64;

  let mut out: Vec<OutlierWeek> = weeks
    .iter()
    .copied()
    .filter(|w| deviation(w.week_vote_count, avg) > DEVIATION_THRESHOLD)
    .collect();
  out.sort();
  out
}

/// (Re)define `view_name` next to `source` as the outlier-week query.
///
/// Fails with [`ViewError::MissingBase`] when `source` was never created,
/// leaving the warehouse untouched. Fails with [`ViewError::EmptyBase`] when
/// `source` has no rows, in which case any previous definition of the view
/// is dropped as well.
pub fn build_outlier_view<S: VoteStore>(
  store:     &mut S,
  source:    &TableRef,
  view_name: &str,
) -> Result<TableRef, ViewError> {
  let view = source.sibling(view_name)?;

  let exists = store
    .table_exists(source)
    .map_err(|e| ViewError::Storage(Box::new(e)))?;
  if !exists {
    warn!(%source, "base table missing; nothing ingested yet");
    return Err(ViewError::MissingBase { table: source.to_string() });
  }

  let rows = store
    .count_rows(source)
    .map_err(|e| ViewError::Storage(Box::new(e)))?;

  if rows == 0 {
    let dropped = store
      .drop_view_if_exists(&view)
      .map_err(|e| ViewError::Storage(Box::new(e)))?;
    warn!(%source, %view, dropped, "no rows to build outlier view from");
    return Err(ViewError::EmptyBase { table: source.to_string() });
  }

  store
    .replace_outlier_view(source, &view, DEVIATION_THRESHOLD)
    .map_err(|e| ViewError::Storage(Box::new(e)))?;

  info!(%source, %view, base_rows = rows, "outlier view defined");
  Ok(view)
}
