//! Pipeline tests for `SqliteWarehouse` against in-memory and file-backed
//! warehouses.

use std::{
  collections::BTreeMap,
  io::Write as _,
  path::{Path, PathBuf},
};

use chrono::{Datelike as _, Duration, NaiveDate};
use tally_core::{
  Column, ColumnType, IngestError, OutlierWeek, RecordError, SchemaError, TableRef,
  VOTE_COLUMNS, ViewError, VoteStore, build_outlier_view, ensure_schema, ingest,
  outlier::select_outliers,
};

use crate::SqliteWarehouse;

const VIEW: &str = "outlier_weeks";

fn fixture(name: &str) -> PathBuf {
  Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
}

fn votes() -> TableRef { TableRef::new("blog_analysis", "votes").unwrap() }

fn warehouse() -> SqliteWarehouse {
  let mut w = SqliteWarehouse::open_in_memory().expect("in-memory warehouse");
  ensure_schema(&mut w, &votes(), &VOTE_COLUMNS).expect("schema");
  w
}

fn vote_line(id: usize, date: &str) -> String {
  format!(r#"{{"Id":"{id}","PostId":"1","VoteTypeId":"2","CreationDate":"{date}"}}"#)
}

fn jsonl(lines: &[String]) -> tempfile::NamedTempFile {
  let mut f = tempfile::NamedTempFile::new().unwrap();
  for l in lines {
    writeln!(f, "{l}").unwrap();
  }
  f
}

fn count(w: &SqliteWarehouse) -> u64 { w.count_rows(&votes()).unwrap() }

// ─── Schema Manager ──────────────────────────────────────────────────────────

#[test]
fn ensure_schema_creates_the_vote_table() {
  let w = warehouse();
  let names = w.column_names(&votes()).unwrap();
  assert_eq!(
    names,
    ["Id", "PostId", "VoteTypeId", "CreationDate", "UserId", "BountyAmount"]
  );
  assert_eq!(count(&w), 0);
}

#[test]
fn ensure_schema_is_idempotent() {
  let mut w = warehouse();
  ingest(&mut w, &votes(), &fixture("samples-votes.jsonl")).unwrap();
  ensure_schema(&mut w, &votes(), &VOTE_COLUMNS).unwrap();
  ensure_schema(&mut w, &votes(), &VOTE_COLUMNS).unwrap();
  assert_eq!(count(&w), 8);
}

#[test]
fn ensure_schema_drops_stale_staging_table() {
  let mut w = warehouse();
  let staging = votes().staging();
  w.create_table_if_absent(&staging, &VOTE_COLUMNS).unwrap();
  assert!(w.column_names(&staging).unwrap().len() == 6);

  ensure_schema(&mut w, &votes(), &VOTE_COLUMNS).unwrap();
  assert!(w.column_names(&staging).unwrap().is_empty());
  assert!(!w.drop_table_if_exists(&staging).unwrap());
}

#[test]
fn ensure_schema_rejects_a_table_of_another_shape() {
  let mut w = SqliteWarehouse::open_in_memory().unwrap();
  let other = [Column { name: "Id", ty: ColumnType::Text, not_null: true }];
  w.ensure_namespace("blog_analysis").unwrap();
  w.create_table_if_absent(&votes(), &other).unwrap();

  let err = ensure_schema(&mut w, &votes(), &VOTE_COLUMNS).unwrap_err();
  assert!(matches!(err, SchemaError::ShapeMismatch { ref found, .. } if found == &["Id"]));
}

#[test]
fn not_null_columns_are_enforced_by_the_table() {
  let w = warehouse();
  let res = w.connection().execute(
    "INSERT INTO \"blog_analysis\".\"votes\" (\"Id\", \"PostId\", \"VoteTypeId\")
     VALUES ('1', '1', '2')",
    [],
  );
  assert!(res.is_err());
}

// ─── Ingest ──────────────────────────────────────────────────────────────────

#[test]
fn ingest_loads_every_sample_row() {
  let mut w = warehouse();
  let summary = ingest(&mut w, &votes(), &fixture("samples-votes.jsonl")).unwrap();
  assert_eq!(summary.rows_read, 8);
  assert_eq!(summary.rows_before, 0);
  assert_eq!(summary.rows_after, 8);
  assert_eq!(summary.rows_added(), 8);
  assert_eq!(count(&w), 8);
}

#[test]
fn ingesting_twice_does_not_duplicate_rows() {
  let mut w = warehouse();
  ingest(&mut w, &votes(), &fixture("samples-votes.jsonl")).unwrap();
  let second = ingest(&mut w, &votes(), &fixture("samples-votes.jsonl")).unwrap();
  assert_eq!(second.rows_read, 8);
  assert_eq!(second.rows_added(), 0);
  assert_eq!(count(&w), 8);
}

#[test]
fn duplicate_lines_within_a_batch_collapse() {
  let mut w = warehouse();
  let line = vote_line(1, "2022-01-03T00:00:00.000");
  let f = jsonl(&[line.clone(), line.clone(), line]);
  let summary = ingest(&mut w, &votes(), f.path()).unwrap();
  assert_eq!(summary.rows_read, 3);
  assert_eq!(count(&w), 1);
}

#[test]
fn equal_instants_in_different_formats_deduplicate() {
  let mut w = warehouse();
  let f = jsonl(&[
    vote_line(1, "2022-01-03T10:00:00"),
    vote_line(1, "2022-01-03 10:00:00.000"),
    vote_line(1, "2022-01-03T11:00:00+01:00"),
  ]);
  ingest(&mut w, &votes(), f.path()).unwrap();
  assert_eq!(count(&w), 1);
}

#[test]
fn rows_differing_in_any_column_are_kept() {
  let mut w = warehouse();
  let f = jsonl(&[
    r#"{"Id":"1","PostId":"1","VoteTypeId":"2","CreationDate":"2022-01-03"}"#.to_owned(),
    r#"{"Id":"1","PostId":"1","VoteTypeId":"2","CreationDate":"2022-01-03","UserId":"5"}"#.to_owned(),
  ]);
  ingest(&mut w, &votes(), f.path()).unwrap();
  assert_eq!(count(&w), 2);
}

#[test]
fn corrupt_batch_is_rejected_whole() {
  let mut w = warehouse();
  ingest(&mut w, &votes(), &fixture("samples-votes.jsonl")).unwrap();

  let err = ingest(&mut w, &votes(), &fixture("samples-votes-corrupt.jsonl")).unwrap_err();
  match &err {
    IngestError::Validation { line, source } => {
      assert_eq!(*line, 3);
      assert_eq!(*source, RecordError::Missing("PostId"));
    }
    other => panic!("expected validation failure, got {other:?}"),
  }
  assert!(err.is_rejection());
  assert_eq!(count(&w), 8);

  let ids: Vec<String> = w
    .connection()
    .prepare("SELECT \"Id\" FROM \"blog_analysis\".\"votes\" WHERE \"Id\" LIKE '10%'")
    .unwrap()
    .query_map([], |r| r.get(0))
    .unwrap()
    .collect::<rusqlite::Result<_>>()
    .unwrap();
  assert!(ids.is_empty(), "no row from the rejected batch may persist: {ids:?}");
}

#[test]
fn extra_fields_are_tolerated_and_dropped() {
  let mut w = warehouse();
  ingest(&mut w, &votes(), &fixture("samples-votes.jsonl")).unwrap();
  let summary =
    ingest(&mut w, &votes(), &fixture("samples-votes-extra-field.jsonl")).unwrap();
  assert_eq!(summary.rows_read, 4);
  assert_eq!(summary.rows_added(), 4);
  assert_eq!(count(&w), 12);
  assert_eq!(w.column_names(&votes()).unwrap().len(), 6);
}

#[test]
fn overlapping_ingests_grow_monotonically() {
  let mut w = warehouse();
  let a: Vec<String> = (1..=5).map(|i| vote_line(i, "2022-01-03")).collect();
  let b: Vec<String> = (4..=9).map(|i| vote_line(i, "2022-01-03")).collect();
  let c: Vec<String> = (1..=3).map(|i| vote_line(i, "2022-01-03")).collect();

  let mut previous = 0;
  let mut lines_so_far = 0;
  for batch in [&a, &b, &c] {
    let f = jsonl(batch);
    ingest(&mut w, &votes(), f.path()).unwrap();
    lines_so_far += batch.len() as u64;
    let now = count(&w);
    assert!(now >= previous);
    assert!(now <= lines_so_far);
    previous = now;
  }
  assert_eq!(previous, 9);
}

#[test]
fn empty_file_is_a_no_op() {
  let mut w = warehouse();
  let f = jsonl(&[]);
  let summary = ingest(&mut w, &votes(), f.path()).unwrap();
  assert_eq!(summary.rows_read, 0);
  assert_eq!(count(&w), 0);
}

#[test]
fn ingest_into_missing_table_is_a_storage_error() {
  let mut w = SqliteWarehouse::open_in_memory().unwrap();
  w.ensure_namespace("blog_analysis").unwrap();
  let err = ingest(&mut w, &votes(), &fixture("samples-votes.jsonl")).unwrap_err();
  assert!(matches!(err, IngestError::Storage(_)));
}

#[test]
fn wide_numeric_ids_stay_distinct() {
  let mut w = warehouse();
  let line = |id: &str| {
    format!(r#"{{"Id":{id},"PostId":1,"VoteTypeId":2,"CreationDate":"2022-01-03"}}"#)
  };
  let f = jsonl(&[line("123456789012345678901234"), line("123456789012345678901235")]);
  ingest(&mut w, &votes(), f.path()).unwrap();
  assert_eq!(count(&w), 2);

  let ids: Vec<String> = w
    .connection()
    .prepare("SELECT \"Id\" FROM \"blog_analysis\".\"votes\" ORDER BY \"Id\"")
    .unwrap()
    .query_map([], |r| r.get(0))
    .unwrap()
    .collect::<rusqlite::Result<_>>()
    .unwrap();
  assert_eq!(ids, ["123456789012345678901234", "123456789012345678901235"]);
}

#[test]
fn non_utf8_batch_is_rejected_whole() {
  let mut w = warehouse();
  ingest(&mut w, &votes(), &fixture("samples-votes.jsonl")).unwrap();

  let mut f = tempfile::NamedTempFile::new().unwrap();
  writeln!(f, "{}", vote_line(300, "2022-01-03T00:00:00.000")).unwrap();
  f.write_all(b"{\"Id\":\"\xff\"}\n").unwrap();

  let err = ingest(&mut w, &votes(), f.path()).unwrap_err();
  assert!(err.is_rejection(), "{err:?}");
  assert!(matches!(err, IngestError::Validation { line: 2, source: RecordError::Malformed(_) }));
  assert_eq!(count(&w), 8);
}

// ─── Outlier view ────────────────────────────────────────────────────────────

#[test]
fn sample_fixture_flags_both_weeks() {
  let mut w = warehouse();
  ingest(&mut w, &votes(), &fixture("samples-votes.jsonl")).unwrap();
  let view = build_outlier_view(&mut w, &votes(), VIEW).unwrap();

  let rows = w.outlier_weeks(&view).unwrap();
  assert_eq!(rows, vec![
    OutlierWeek { year_number: 2022, week_number: 1, week_vote_count: 6 },
    OutlierWeek { year_number: 2022, week_number: 2, week_vote_count: 2 },
  ]);
}

#[test]
fn only_weeks_beyond_the_threshold_are_listed() {
  let mut w = warehouse();
  // Weeks 1, 2, 3 of 2022 with 10, 10, 16 votes: average 12.
  let mut lines = Vec::new();
  let mut id = 0;
  for (monday, n) in [("2022-01-03", 10), ("2022-01-10", 10), ("2022-01-17", 16)] {
    let start = NaiveDate::parse_from_str(monday, "%Y-%m-%d").unwrap();
    for k in 0..n {
      id += 1;
      let day = start + Duration::days(k % 7);
      lines.push(vote_line(id, &format!("{day}T12:00:00.000")));
    }
  }
  let f = jsonl(&lines);
  ingest(&mut w, &votes(), f.path()).unwrap();

  let view = build_outlier_view(&mut w, &votes(), VIEW).unwrap();
  assert_eq!(w.outlier_weeks(&view).unwrap(), vec![OutlierWeek {
    year_number:     2022,
    week_number:     3,
    week_vote_count: 16,
  }]);
}

#[test]
fn view_matches_in_memory_reference_across_year_boundary() {
  let mut w = warehouse();
  let start = NaiveDate::from_ymd_opt(2020, 12, 14).unwrap();
  let mut lines = Vec::new();
  let mut expected: BTreeMap<(i64, i64), i64> = BTreeMap::new();
  let mut id = 0;
  for offset in 0..70 {
    let day = start + Duration::days(offset);
    // Uneven daily volume so some weeks stand out.
    let n = (offset * 7 % 11) as usize + if offset % 23 == 0 { 9 } else { 0 };
    for _ in 0..n {
      id += 1;
      lines.push(vote_line(id, &format!("{day}T08:30:00.000")));
    }
    let key = (day.year() as i64, day.iso_week().week() as i64);
    *expected.entry(key).or_default() += n as i64;
  }
  expected.retain(|_, n| *n > 0);

  let f = jsonl(&lines);
  ingest(&mut w, &votes(), f.path()).unwrap();
  let view = build_outlier_view(&mut w, &votes(), VIEW).unwrap();

  let weekly: Vec<OutlierWeek> = expected
    .into_iter()
    .map(|((year_number, week_number), week_vote_count)| OutlierWeek {
      year_number,
      week_number,
      week_vote_count,
    })
    .collect();
  let reference = select_outliers(&weekly);
  assert!(!reference.is_empty());
  assert_eq!(w.outlier_weeks(&view).unwrap(), reference);
}

#[test]
fn iso_week_uses_calendar_year_of_the_vote() {
  let mut w = warehouse();
  // Sunday 2022-01-02 is in ISO week 52 of 2021; Monday 2022-01-03 is week 1.
  let f = jsonl(&[
    vote_line(1, "2022-01-02T23:59:59.000"),
    vote_line(2, "2022-01-03T00:00:00.000"),
    vote_line(3, "2022-01-04T00:00:00.000"),
    vote_line(4, "2022-01-05T00:00:00.000"),
  ]);
  ingest(&mut w, &votes(), f.path()).unwrap();
  let view = build_outlier_view(&mut w, &votes(), VIEW).unwrap();
  assert_eq!(w.outlier_weeks(&view).unwrap(), vec![
    OutlierWeek { year_number: 2022, week_number: 1, week_vote_count: 3 },
    OutlierWeek { year_number: 2022, week_number: 52, week_vote_count: 1 },
  ]);
}

#[test]
fn view_reflects_later_ingests() {
  let mut w = warehouse();
  ingest(&mut w, &votes(), &fixture("samples-votes.jsonl")).unwrap();
  let view = build_outlier_view(&mut w, &votes(), VIEW).unwrap();
  assert_eq!(w.outlier_weeks(&view).unwrap().len(), 2);

  // Four more votes in week 2 balance the weeks at 6 each.
  let f = jsonl(&(11..=14).map(|i| vote_line(i, "2022-01-12T00:00:00.000")).collect::<Vec<_>>());
  ingest(&mut w, &votes(), f.path()).unwrap();
  assert!(w.outlier_weeks(&view).unwrap().is_empty());
}

#[test]
fn rebuilding_the_view_replaces_it() {
  let mut w = warehouse();
  ingest(&mut w, &votes(), &fixture("samples-votes.jsonl")).unwrap();
  build_outlier_view(&mut w, &votes(), VIEW).unwrap();
  let view = build_outlier_view(&mut w, &votes(), VIEW).unwrap();
  assert_eq!(w.outlier_weeks(&view).unwrap().len(), 2);
}

#[test]
fn empty_base_is_reported_and_leaves_no_view() {
  let mut w = warehouse();
  let view = votes().sibling(VIEW).unwrap();
  w.replace_outlier_view(&votes(), &view, 0.2).unwrap();

  let err = build_outlier_view(&mut w, &votes(), VIEW).unwrap_err();
  assert!(matches!(err, ViewError::EmptyBase { .. }));
  assert!(w.outlier_weeks(&view).is_err(), "stale view must be gone");
  assert!(!w.drop_view_if_exists(&view).unwrap());
}

#[test]
fn view_over_a_never_created_table_is_reported() {
  let mut w = SqliteWarehouse::open_in_memory().unwrap();
  let err = build_outlier_view(&mut w, &votes(), VIEW).unwrap_err();
  assert!(matches!(err, ViewError::MissingBase { .. }), "{err:?}");
}

#[test]
fn invalid_view_name_is_rejected() {
  let mut w = warehouse();
  ingest(&mut w, &votes(), &fixture("samples-votes.jsonl")).unwrap();
  let err = build_outlier_view(&mut w, &votes(), "weeks; DROP TABLE votes").unwrap_err();
  assert!(matches!(err, ViewError::Schema(SchemaError::InvalidIdentifier(_))));
  assert_eq!(count(&w), 8);
}

// ─── File-backed warehouse ───────────────────────────────────────────────────

#[test]
fn warehouse_file_persists_between_runs() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("warehouse.db");

  {
    let mut w = SqliteWarehouse::open(&path).unwrap();
    ensure_schema(&mut w, &votes(), &VOTE_COLUMNS).unwrap();
    ingest(&mut w, &votes(), &fixture("samples-votes.jsonl")).unwrap();
  }
  assert!(path.exists());

  {
    let mut w = SqliteWarehouse::open(&path).unwrap();
    ensure_schema(&mut w, &votes(), &VOTE_COLUMNS).unwrap();
    ingest(&mut w, &votes(), &fixture("samples-votes.jsonl")).unwrap();
    assert_eq!(count(&w), 8);
  }

  let mut w = SqliteWarehouse::open(&path).unwrap();
  let view = build_outlier_view(&mut w, &votes(), VIEW).unwrap();
  assert_eq!(w.outlier_weeks(&view).unwrap().len(), 2);
}

#[test]
fn view_before_any_ingest_does_not_create_the_file() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("warehouse.db");

  let mut w = SqliteWarehouse::open(&path).unwrap();
  let err = build_outlier_view(&mut w, &votes(), VIEW).unwrap_err();
  assert!(matches!(err, ViewError::MissingBase { .. }), "{err:?}");
  assert!(!path.exists());
}

#[test]
fn ingest_in_a_new_connection_keeps_the_view_queryable() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("warehouse.db");

  {
    let mut w = SqliteWarehouse::open(&path).unwrap();
    ensure_schema(&mut w, &votes(), &VOTE_COLUMNS).unwrap();
    ingest(&mut w, &votes(), &fixture("samples-votes.jsonl")).unwrap();
    build_outlier_view(&mut w, &votes(), VIEW).unwrap();
  }

  let mut w = SqliteWarehouse::open(&path).unwrap();
  ensure_schema(&mut w, &votes(), &VOTE_COLUMNS).unwrap();
  let summary = ingest(&mut w, &votes(), &fixture("samples-votes-extra-field.jsonl")).unwrap();
  assert_eq!(summary.rows_after, 12);

  // The view defined by the earlier connection survives the swap and reads
  // the same rows as a freshly defined one.
  let view = votes().sibling(VIEW).unwrap();
  let existing = w.outlier_weeks(&view).unwrap();
  let rebuilt = build_outlier_view(&mut w, &votes(), VIEW).unwrap();
  assert_eq!(existing, w.outlier_weeks(&rebuilt).unwrap());
}
