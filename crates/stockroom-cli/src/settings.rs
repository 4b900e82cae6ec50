//! Operator configuration.
//!
//! Loaded from an optional TOML file overlaid with `STOCKROOM_*` environment
//! variables; nested keys use `__`, e.g. `STOCKROOM_POLICY__PIN_TTL_MINUTES`.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use serde::Deserialize;
use stockroom_core::{
  actor::{Actor, Role},
  collab::InMemoryDirectory,
  policy::Policy,
};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  /// SQLite database file. A leading `~/` is expanded.
  #[serde(default = "default_store_path")]
  pub store_path:  PathBuf,
  /// The user every command acts as.
  pub operator_id: Option<Uuid>,
  #[serde(default)]
  pub policy:      Policy,
  #[serde(default)]
  pub users:       Vec<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
  pub id:           Uuid,
  pub role:         Role,
  #[serde(default)]
  pub display_name: String,
}

fn default_store_path() -> PathBuf { PathBuf::from("stockroom.db") }

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("STOCKROOM")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read configuration")?
      .try_deserialize()
      .context("failed to deserialise settings")
  }

  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }

  pub fn directory(&self) -> InMemoryDirectory {
    self.users.iter().map(|u| (u.id, u.role)).collect()
  }

  /// The configured operator, resolved against `[[users]]`.
  pub fn operator(&self) -> anyhow::Result<Actor> {
    let Some(id) = self.operator_id else {
      bail!("operator_id is not set");
    };
    let user = self
      .users
      .iter()
      .find(|u| u.id == id)
      .with_context(|| format!("operator {id} is not listed in [[users]]"))?;
    tracing::debug!(operator = %id, name = %user.display_name, "resolved operator");
    Ok(Actor { user_id: id, role: user.role })
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
