//! SQL text for the tally SQLite warehouse.
//!
//! Identifiers reaching this module are already validated by
//! [`TableRef`](tally_core::TableRef); they are still double-quoted.

use tally_core::{Column, ColumnType, TableRef};

/// Connection-level settings applied at open.
///
/// `legacy_alter_table` keeps `ALTER TABLE … RENAME` from re-resolving views
/// while the dedup swap has the base table dropped.
pub const CONNECTION_PRAGMAS: &str = "
PRAGMA legacy_alter_table = ON;
";

pub fn quote_ident(ident: &str) -> String {
  format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn qualified(table: &TableRef) -> String {
  format!("{}.{}", quote_ident(table.namespace()), quote_ident(table.name()))
}

fn sql_type(ty: ColumnType) -> &'static str {
  match ty {
    ColumnType::Text | ColumnType::Timestamp => "TEXT",
  }
}

fn column_defs(columns: &[Column]) -> String {
  columns
    .iter()
    .map(|c| {
      let null = if c.not_null { " NOT NULL" } else { "" };
      format!("{} {}{null}", quote_ident(c.name), sql_type(c.ty))
    })
    .collect::<Vec<_>>()
    .join(", ")
}

pub fn create_table(table: &TableRef, columns: &[Column], if_not_exists: bool) -> String {
  let guard = if if_not_exists { "IF NOT EXISTS " } else { "" };
  format!(
    "CREATE TABLE {guard}{} ({}) STRICT",
    qualified(table),
    column_defs(columns)
  )
}

pub fn insert(table: &TableRef, columns: &[Column]) -> String {
  let names = columns
    .iter()
    .map(|c| quote_ident(c.name))
    .collect::<Vec<_>>()
    .join(", ");
  let params = (1..=columns.len())
    .map(|i| format!("?{i}"))
    .collect::<Vec<_>>()
    .join(", ");
  format!("INSERT INTO {} ({names}) VALUES ({params})", qualified(table))
}

/// The outlier-week view body.
///
/// `week_number` is the ISO-8601 week: the day-of-year of the Thursday in the
/// same Monday-to-Sunday week, divided into sevens. `year_number` is the
/// calendar year of the vote itself. The view body names `source` without a
/// schema prefix; SQLite binds it to the view's own schema.
pub fn create_outlier_view(source: &TableRef, view: &TableRef, threshold: f64) -> String {
  format!(
    "CREATE VIEW {view} AS
WITH weekly AS (
  SELECT
    CAST(strftime('%Y', \"CreationDate\") AS INTEGER) AS year_number,
    (CAST(strftime('%j', date(\"CreationDate\", '-3 days', 'weekday 4')) AS INTEGER) - 1) / 7 + 1
      AS week_number,
    COUNT(*) AS week_vote_count
  FROM {source}
  GROUP BY year_number, week_number
),
totals AS (
  SELECT
    COUNT(*)                                      AS total_weeks,
    SUM(week_vote_count)                          AS total_votes,
    CAST(SUM(week_vote_count) AS REAL) / COUNT(*) AS avg_votes_per_week
  FROM weekly
)
SELECT w.year_number, w.week_number, w.week_vote_count
FROM weekly w CROSS JOIN totals t
WHERE abs(1.0 - CAST(w.week_vote_count AS REAL) / t.avg_votes_per_week) > {threshold:?}",
    view   = qualified(view),
    source = quote_ident(source.name()),
  )
}
