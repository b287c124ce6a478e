//! `dtmirror`: mirror IETF Datatracker people (and optionally documents)
//! into a local SQLite database or JSON document tree.
//!
//! Reads `dtmirror.toml` (or the path given with `--config`), then
//! `DTMIRROR_*` environment variables, then command-line flags.

mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use dtmirror_core::{
  store::{MirrorStore, StoreSummary},
  sync::{Mirror, SyncOptions},
};
use dtmirror_datatracker::{ClientConfig, DatatrackerClient, DiskCache};
use dtmirror_store_sqlite::SqliteStore;
use dtmirror_store_tree::TreeStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::{MirrorConfig, Target};

#[derive(Parser)]
#[command(
  author,
  version,
  about = "Mirror IETF Datatracker people and documents",
  long_about = "Mirror IETF Datatracker people and documents into a local SQLite \
                database or JSON document tree.\n\n\
                Runs are incremental: only people changed since the newest one \
                already stored are fetched. Do not run two instances against the \
                same store at the same time; nothing prevents it and the results \
                are undefined."
)]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, env = "DTMIRROR_CONFIG", default_value = "dtmirror.toml", global = true)]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Fetch changed records and write them to the local store.
  Sync(SyncArgs),
  /// Show the local watermark and record counts.
  Status {
    /// Store to inspect (overrides `target` in the config).
    #[arg(long, value_enum)]
    target: Option<Target>,
  },
}

#[derive(Args)]
struct SyncArgs {
  /// Store to write (overrides `target` in the config).
  #[arg(long, value_enum)]
  target:    Option<Target>,
  /// Ignore the local watermark and walk the whole catalog.
  #[arg(long)]
  full:      bool,
  /// Also mirror the document listing.
  #[arg(long)]
  documents: bool,
  /// Bypass the response cache even if `use_cache` is set.
  #[arg(long)]
  no_cache:  bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let mut cfg = MirrorConfig::load(&cli.config)?;

  match cli.command {
    Command::Sync(args) => {
      if let Some(target) = args.target {
        cfg.target = target;
      }
      cfg.documents |= args.documents;
      cfg.use_cache &= !args.no_cache;
      let options = SyncOptions { full: args.full, documents: cfg.documents };
      sync(&cfg, options).await
    }
    Command::Status { target } => {
      if let Some(target) = target {
        cfg.target = target;
      }
      status(&cfg).await
    }
  }
}

// ─── sync ────────────────────────────────────────────────────────────────────

async fn sync(cfg: &MirrorConfig, options: SyncOptions) -> anyhow::Result<()> {
  let mut client = DatatrackerClient::new(ClientConfig {
    base_url:  cfg.base_url.clone(),
    timeout:   cfg.timeout(),
    page_size: cfg.page_size,
  })
  .context("failed to build HTTP client")?;
  if cfg.use_cache {
    tracing::info!(dir = %cfg.cache_dir.display(), "using response cache");
    client = client.with_cache(DiskCache::new(&cfg.cache_dir, cfg.cache_ttl()));
  }

  match cfg.target {
    Target::Sqlite => {
      let store = open_sqlite(cfg).await?;
      run(&client, &store, options).await
    }
    Target::Tree => {
      let store = open_tree(cfg).await?;
      run(&client, &store, options).await
    }
  }
}

async fn run<S: MirrorStore>(
  client: &DatatrackerClient,
  store: &S,
  options: SyncOptions,
) -> anyhow::Result<()> {
  let report = Mirror::new(client, store, client)
    .run(options)
    .await
    .context("sync aborted")?;

  if report.people_failed + report.documents_failed + report.assets_failed > 0 {
    tracing::warn!(
      people = report.people_failed,
      documents = report.documents_failed,
      assets = report.assets_failed,
      "some records were not mirrored; see the log above"
    );
  }
  Ok(())
}

// ─── status ──────────────────────────────────────────────────────────────────

async fn status(cfg: &MirrorConfig) -> anyhow::Result<()> {
  match cfg.target {
    Target::Sqlite => {
      let store = open_sqlite(cfg).await?;
      print_summary(&store.summary().await?);
      for (table, rows) in store.row_counts().await? {
        println!("  {table:<18} {rows}");
      }
    }
    Target::Tree => {
      let store = open_tree(cfg).await?;
      print_summary(&store.summary().await?);
    }
  }
  Ok(())
}

fn print_summary(summary: &StoreSummary) {
  match summary.watermark {
    Some(watermark) => println!("watermark: {}", watermark.to_rfc3339()),
    None => println!("watermark: none (empty store)"),
  }
  println!("people:    {}", summary.people);
  println!("documents: {}", summary.documents);
}

// ─── Stores ──────────────────────────────────────────────────────────────────

async fn open_sqlite(cfg: &MirrorConfig) -> anyhow::Result<SqliteStore> {
  SqliteStore::open(&cfg.database)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.database))
}

async fn open_tree(cfg: &MirrorConfig) -> anyhow::Result<TreeStore> {
  TreeStore::open(&cfg.data_dir)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.data_dir))
}
