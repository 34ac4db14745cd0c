//! The fixed vote table definition and the Schema Manager.

use tracing::{debug, info};

use crate::{
  error::SchemaError,
  store::VoteStore,
};

// ─── Columns ─────────────────────────────────────────────────────────────────

/// Logical column type. Backends map these onto their own storage types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
  Text,
  /// Canonical `YYYY-MM-DDTHH:MM:SS.fff` text.
  Timestamp,
}

/// One column of a table definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
  pub name:     &'static str,
  pub ty:       ColumnType,
  pub not_null: bool,
}

impl Column {
  const fn required(name: &'static str, ty: ColumnType) -> Self {
    Self { name, ty, not_null: true }
  }

  const fn optional(name: &'static str, ty: ColumnType) -> Self {
    Self { name, ty, not_null: false }
  }
}

/// The vote table: six columns, the first four NOT NULL. Column names match
/// the JSON field names of the source records.
pub const VOTE_COLUMNS: [Column; 6] = [
  Column::required("Id",           ColumnType::Text),
  Column::required("PostId",       ColumnType::Text),
  Column::required("VoteTypeId",   ColumnType::Text),
  Column::required("CreationDate", ColumnType::Timestamp),
  Column::optional("UserId",       ColumnType::Text),
  Column::optional("BountyAmount", ColumnType::Text),
];

// ─── Object names ────────────────────────────────────────────────────────────

/// A namespace-qualified object name, validated as plain identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
  namespace: String,
  name:      String,
}

impl TableRef {
  pub fn new(
    namespace: impl Into<String>,
    name: impl Into<String>,
  ) -> Result<Self, SchemaError> {
    let namespace = namespace.into();
    let name = name.into();
    validate_identifier(&namespace)?;
    validate_identifier(&name)?;
    Ok(Self { namespace, name })
  }

  pub fn namespace(&self) -> &str { &self.namespace }

  pub fn name(&self) -> &str { &self.name }

  /// Another object in the same namespace.
  pub fn sibling(&self, name: impl Into<String>) -> Result<Self, SchemaError> {
    Self::new(self.namespace.clone(), name)
  }

  /// The transient table the dedup swap writes distinct rows into.
  pub fn staging(&self) -> Self {
    Self {
      namespace: self.namespace.clone(),
      name:      format!("{}__staging", self.name),
    }
  }
}

impl std::fmt::Display for TableRef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}.{}", self.namespace, self.name)
  }
}

/// Accept `[A-Za-z_][A-Za-z0-9_]*` only.
pub fn validate_identifier(ident: &str) -> Result<(), SchemaError> {
  let mut chars = ident.chars();
  let valid_head = chars
    .next()
    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
  if valid_head && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
    Ok(())
  } else {
    Err(SchemaError::InvalidIdentifier(ident.to_owned()))
  }
}

// ─── Schema Manager ──────────────────────────────────────────────────────────

/// Make sure `table` exists with exactly `columns`, and clear out any staging
/// table abandoned by an interrupted dedup swap. Safe to call on every run.
pub fn ensure_schema<S: VoteStore>(
  store:   &mut S,
  table:   &TableRef,
  columns: &[Column],
) -> Result<(), SchemaError> {
  store
    .ensure_namespace(table.namespace())
    .map_err(|e| SchemaError::Storage(Box::new(e)))?;

  store
    .create_table_if_absent(table, columns)
    .map_err(|e| SchemaError::Storage(Box::new(e)))?;

  let found = store
    .column_names(table)
    .map_err(|e| SchemaError::Storage(Box::new(e)))?;
  let expected: Vec<String> = columns.iter().map(|c| c.name.to_owned()).collect();
  if found != expected {
    return Err(SchemaError::ShapeMismatch {
      table: table.to_string(),
      expected,
      found,
    });
  }

  let staging = table.staging();
  let dropped = store
    .drop_table_if_exists(&staging)
    .map_err(|e| SchemaError::Storage(Box::new(e)))?;
  if dropped {
    info!(%staging, "dropped stale staging table");
  }

  debug!(%table, "schema ready");
  Ok(())
}
