//! Runtime configuration: built-in defaults, then the TOML file, then
//! `DTMIRROR_*` environment variables. Command-line flags are applied on top
//! by `main`.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use serde::Deserialize;

/// Which local representation to mirror into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Target {
  /// A single SQLite database file.
  Sqlite,
  /// A directory of JSON documents plus downloaded photos.
  Tree,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
  pub base_url:       String,
  pub target:         Target,
  pub database:       PathBuf,
  pub data_dir:       PathBuf,
  /// Serve unbounded listing walks (first or `--full` runs) from
  /// `cache_dir`. Incremental runs always go to the network.
  pub use_cache:      bool,
  pub cache_dir:      PathBuf,
  pub cache_ttl_secs: u64,
  pub timeout_secs:   u64,
  pub page_size:      u32,
  pub documents:      bool,
}

impl Default for MirrorConfig {
  fn default() -> Self {
    Self {
      base_url:       "https://datatracker.ietf.org".to_owned(),
      target:         Target::Sqlite,
      database:       PathBuf::from("ietfdata.db"),
      data_dir:       PathBuf::from("data"),
      use_cache:      false,
      cache_dir:      PathBuf::from("dtmirror-cache"),
      cache_ttl_secs: 86_400,
      timeout_secs:   30,
      page_size:      100,
      documents:      false,
    }
  }
}

impl MirrorConfig {
  /// Read `path` (if it exists) and the environment over the defaults.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("DTMIRROR"))
      .build()
      .context("failed to read config file")?;

    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise MirrorConfig")?;

    cfg.database = expand_tilde(&cfg.database);
    cfg.data_dir = expand_tilde(&cfg.data_dir);
    cfg.cache_dir = expand_tilde(&cfg.cache_dir);
    Ok(cfg)
  }

  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }

  pub fn cache_ttl(&self) -> Duration { Duration::from_secs(self.cache_ttl_secs) }
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
