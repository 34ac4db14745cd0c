//! [`SqliteWarehouse`], the SQLite implementation of [`VoteStore`].

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension as _};
use tally_core::{Column, OutlierWeek, TableRef, VOTE_COLUMNS, VoteRecord, VoteStore};
use tracing::debug;

use crate::{
  Error, Result,
  schema::{self, CONNECTION_PRAGMAS, qualified, quote_ident},
};

// ─── Warehouse ───────────────────────────────────────────────────────────────

/// Where namespaces attached by this warehouse live.
#[derive(Debug, Clone)]
enum Location {
  File(PathBuf),
  Memory,
}

/// A vote warehouse backed by a single SQLite file.
///
/// The connection's `main` database is a scratch in-memory one; the file is
/// attached under the namespace name on first use.
pub struct SqliteWarehouse {
  conn:     Connection,
  location: Location,
}

impl SqliteWarehouse {
  /// Open a warehouse whose namespaces are stored in the file at `path`.
  /// The file is created on first attach if it does not exist.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    if path.to_str().is_none() {
      return Err(Error::NonUtf8Path(path));
    }
    Self::with_location(Location::File(path))
  }

  /// Open a warehouse that lives only as long as this value; useful for
  /// testing.
  pub fn open_in_memory() -> Result<Self> { Self::with_location(Location::Memory) }

  fn with_location(location: Location) -> Result<Self> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(CONNECTION_PRAGMAS)?;
    Ok(Self { conn, location })
  }

  #[cfg(test)]
  pub(crate) fn connection(&self) -> &Connection { &self.conn }

  fn is_attached(&self, namespace: &str) -> Result<bool> {
    Ok(
      self
        .conn
        .query_row(
          "SELECT 1 FROM pragma_database_list WHERE name = ?1",
          rusqlite::params![namespace],
          |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false),
    )
  }

  fn object_exists(&self, object: &TableRef, kind: &str) -> Result<bool> {
    let sql = format!(
      "SELECT 1 FROM {}.sqlite_master WHERE type = ?1 AND name = ?2",
      quote_ident(object.namespace())
    );
    Ok(
      self
        .conn
        .query_row(&sql, rusqlite::params![kind, object.name()], |_| Ok(true))
        .optional()?
        .unwrap_or(false),
    )
  }
}

// ─── VoteStore impl ──────────────────────────────────────────────────────────

impl VoteStore for SqliteWarehouse {
  type Error = Error;

  // ── DDL ───────────────────────────────────────────────────────────────────

  fn ensure_namespace(&mut self, namespace: &str) -> Result<()> {
    if self.is_attached(namespace)? {
      return Ok(());
    }

    let target = match &self.location {
      Location::File(path) => path.to_str().ok_or_else(|| Error::NonUtf8Path(path.clone()))?,
      Location::Memory => ":memory:",
    };
    self.conn.execute(
      &format!("ATTACH DATABASE ?1 AS {}", quote_ident(namespace)),
      rusqlite::params![target],
    )?;

    if let Location::File(_) = self.location {
      let mode: String = self.conn.query_row(
        &format!("PRAGMA {}.journal_mode = WAL", quote_ident(namespace)),
        [],
        |row| row.get(0),
      )?;
      debug!(namespace, target, journal_mode = %mode, "namespace attached");
    }
    Ok(())
  }

  fn create_table_if_absent(&mut self, table: &TableRef, columns: &[Column]) -> Result<()> {
    self.conn.execute(&schema::create_table(table, columns, true), [])?;
    Ok(())
  }

  fn column_names(&self, table: &TableRef) -> Result<Vec<String>> {
    let mut stmt = self
      .conn
      .prepare("SELECT name FROM pragma_table_info(?1, ?2) ORDER BY cid")?;
    let names = stmt
      .query_map(rusqlite::params![table.name(), table.namespace()], |row| row.get(0))?
      .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
  }

  fn table_exists(&mut self, table: &TableRef) -> Result<bool> {
    if !self.is_attached(table.namespace())? {
      // Attaching a missing file would create it.
      if !matches!(&self.location, Location::File(path) if path.exists()) {
        return Ok(false);
      }
      self.ensure_namespace(table.namespace())?;
    }
    self.object_exists(table, "table")
  }

  fn drop_table_if_exists(&mut self, table: &TableRef) -> Result<bool> {
    if !self.object_exists(table, "table")? {
      return Ok(false);
    }
    self.conn.execute(&format!("DROP TABLE {}", qualified(table)), [])?;
    Ok(true)
  }

  // ── Rows ──────────────────────────────────────────────────────────────────

  fn count_rows(&self, table: &TableRef) -> Result<u64> {
    let n: i64 = self.conn.query_row(
      &format!("SELECT COUNT(*) FROM {}", qualified(table)),
      [],
      |row| row.get(0),
    )?;
    Ok(n as u64)
  }

  fn append(&mut self, table: &TableRef, records: &[VoteRecord]) -> Result<usize> {
    let sql = schema::insert(table, &VOTE_COLUMNS);
    let tx = self.conn.transaction()?;
    {
      let mut stmt = tx.prepare(&sql)?;
      for r in records {
        stmt.execute(rusqlite::params![
          r.id,
          r.post_id,
          r.vote_type_id,
          r.creation_date_text(),
          r.user_id,
          r.bounty_amount,
        ])?;
      }
    }
    tx.commit()?;
    Ok(records.len())
  }

  fn swap_distinct(&mut self, table: &TableRef, columns: &[Column]) -> Result<()> {
    let staging = table.staging();
    let tx = self.conn.transaction()?;
    tx.execute(&format!("DROP TABLE IF EXISTS {}", qualified(&staging)), [])?;
    tx.execute(&schema::create_table(&staging, columns, false), [])?;
    let kept = tx.execute(
      &format!(
        "INSERT INTO {} SELECT DISTINCT * FROM {}",
        qualified(&staging),
        qualified(table)
      ),
      [],
    )?;
    tx.execute(&format!("DROP TABLE {}", qualified(table)), [])?;
    tx.execute(
      &format!(
        "ALTER TABLE {} RENAME TO {}",
        qualified(&staging),
        quote_ident(table.name())
      ),
      [],
    )?;
    tx.commit()?;
    debug!(%table, kept, "distinct swap committed");
    Ok(())
  }

  // ── Views ─────────────────────────────────────────────────────────────────

  fn replace_outlier_view(
    &mut self,
    source:    &TableRef,
    view:      &TableRef,
    threshold: f64,
  ) -> Result<()> {
    let tx = self.conn.transaction()?;
    tx.execute(&format!("DROP VIEW IF EXISTS {}", qualified(view)), [])?;
    tx.execute(&schema::create_outlier_view(source, view, threshold), [])?;
    tx.commit()?;
    Ok(())
  }

  fn drop_view_if_exists(&mut self, view: &TableRef) -> Result<bool> {
    if !self.object_exists(view, "view")? {
      return Ok(false);
    }
    self.conn.execute(&format!("DROP VIEW {}", qualified(view)), [])?;
    Ok(true)
  }

  fn outlier_weeks(&self, view: &TableRef) -> Result<Vec<OutlierWeek>> {
    let mut stmt = self.conn.prepare(&format!(
      "SELECT year_number, week_number, week_vote_count FROM {}
       ORDER BY year_number, week_number",
      qualified(view)
    ))?;
    let rows = stmt
      .query_map([], |row| {
        Ok(OutlierWeek {
          year_number:     row.get(0)?,
          week_number:     row.get(1)?,
          week_vote_count: row.get(2)?,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
  }
}
