//! Runtime settings, layered from an optional TOML file and `ESCOLA_*`
//! environment variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  /// SQLite database file.
  pub store_path:         PathBuf,
  /// Directory uploaded documents are written to.
  pub upload_dir:         PathBuf,
  /// Prefix of the public locator recorded on finalized documents.
  pub public_prefix:      String,
  /// How long an idle worker waits before polling the queue again.
  pub poll_interval_ms:   u64,
  /// How long a claimed upload task may run before another worker takes
  /// it over.
  pub claim_timeout_secs: u64,
}

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let raw = config::Config::builder()
      .set_default("store_path", "escola.db")?
      .set_default("upload_dir", "uploads")?
      .set_default("public_prefix", "/uploads")?
      .set_default("poll_interval_ms", 1000)?
      .set_default("claim_timeout_secs", 300)?
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("ESCOLA"))
      .build()
      .with_context(|| format!("failed to read config file {path:?}"))?;

    let mut settings: Settings = raw
      .try_deserialize()
      .context("failed to deserialise Settings")?;

    settings.store_path = expand_tilde(&settings.store_path);
    settings.upload_dir = expand_tilde(&settings.upload_dir);
    Ok(settings)
  }

  pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }

  pub fn claim_timeout(&self) -> Duration { Duration::from_secs(self.claim_timeout_secs) }
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
