//! Layered configuration: built-in defaults, an optional TOML file, then
//! `TALLY_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use tally_core::{SchemaError, TableRef};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// SQLite file holding the namespace.
  pub database_path: PathBuf,
  pub namespace:     String,
  pub table:         String,
  pub view:          String,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      database_path: PathBuf::from("warehouse.db"),
      namespace:     "blog_analysis".to_owned(),
      table:         "votes".to_owned(),
      view:          "outlier_weeks".to_owned(),
    }
  }
}

impl Settings {
  /// Read `path` if it exists, then apply the environment on top.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("TALLY"))
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?;

    let mut settings: Settings = settings
      .try_deserialize()
      .context("failed to deserialise Settings")?;
    settings.database_path = expand_tilde(&settings.database_path);
    Ok(settings)
  }

  pub fn votes_table(&self) -> Result<TableRef, SchemaError> {
    TableRef::new(self.namespace.clone(), self.table.clone())
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
