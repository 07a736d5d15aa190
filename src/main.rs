use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use offsync::cache::ContentCache;
use offsync::config::Config;
use offsync::logging;
use offsync::network::{HttpProbe, NetworkMonitor};
use offsync::queue::{Action, ActionKind, ActionQueue};
use offsync::secrets::{self, SecretStore, TOKEN_KEY};
use offsync::storage::SqliteStorage;
use offsync::sync::{format_drain_report, HttpActionExecutor, SyncCoordinator};

#[derive(Parser, Debug)]
#[command(name = "offsync")]
#[command(about = "Offline-first content cache and action queue")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show connectivity, queue and cache state
  Status,
  /// Queue an action, e.g. `enqueue mark-alert-read '{"alertId":"a1"}'`
  Enqueue {
    kind: ActionKind,
    /// JSON payload for the action
    payload: String,
  },
  /// Deliver queued actions now if the backend is reachable
  Drain,
  #[command(subcommand)]
  Cache(CacheCommand),
  #[command(subcommand)]
  Queue(QueueCommand),
  #[command(subcommand)]
  Token(TokenCommand),
  /// Watch connectivity and drain on every reconnect until Ctrl-C
  Run,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
  Get { key: String },
  Put {
    key: String,
    /// JSON value
    value: String,
    /// Lifetime in seconds (default: cache.default_ttl_secs)
    #[arg(long)]
    ttl: Option<i64>,
  },
  Remove { key: String },
  Clear,
  /// Sweep expired entries and evict down to capacity
  Cleanup,
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
  List,
  Clear,
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
  /// Store the backend API token (read from stdin when omitted)
  Set { token: Option<String> },
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(None)?;

  match args.command {
    Command::Status => status(&config).await,
    Command::Enqueue { kind, payload } => enqueue(&config, kind, &payload).await,
    Command::Drain => drain(&config).await,
    Command::Cache(cmd) => cache(&config, cmd).await,
    Command::Queue(cmd) => queue(&config, cmd).await,
    Command::Token(cmd) => token(&config, cmd),
    Command::Run => run(&config).await,
  }
}

fn open_storage(config: &Config) -> Result<Arc<SqliteStorage>> {
  let storage = match &config.storage.path {
    Some(path) => SqliteStorage::open(path)?,
    None => SqliteStorage::open_default()?,
  };
  Ok(Arc::new(storage))
}

fn open_secrets(config: &Config) -> Result<Arc<dyn SecretStore>> {
  let store = secrets::create_store(&config.secrets.provider, config.secrets.path.clone())?;
  Ok(Arc::from(store))
}

fn open_cache(config: &Config, storage: &Arc<SqliteStorage>) -> ContentCache<SqliteStorage> {
  ContentCache::new(Arc::clone(storage)).with_settings(config.cache_settings())
}

fn parse_json(raw: &str) -> Result<Value> {
  serde_json::from_str(raw).map_err(|e| eyre!("Invalid JSON: {}", e))
}

async fn build_coordinator(
  config: &Config,
  monitor: NetworkMonitor,
) -> Result<Arc<SyncCoordinator<SqliteStorage>>> {
  let storage = open_storage(config)?;
  let queue = Arc::new(ActionQueue::load(Arc::clone(&storage)).await);
  let cache = Arc::new(open_cache(config, &storage));
  let executor = HttpActionExecutor::new(config.base_url()?, open_secrets(config)?);

  Ok(Arc::new(
    SyncCoordinator::new(queue, cache, Arc::new(executor), monitor)
      .with_settings(config.sync_settings()),
  ))
}

async fn status(config: &Config) -> Result<()> {
  let storage = open_storage(config)?;
  let queue = ActionQueue::load(Arc::clone(&storage)).await;
  let stats = open_cache(config, &storage).stats().await;

  match config.health_url() {
    Ok(url) => {
      let online = HttpProbe::new(url, config.probe_interval()).check().await;
      println!("backend:  {}", if online { "online" } else { "offline" });
    }
    Err(_) => println!("backend:  not configured"),
  }
  println!("queue:    {} pending", queue.size());
  println!(
    "cache:    {} entries ({} expired), {} / {} bytes",
    stats.entries, stats.expired, stats.total_bytes, config.cache.capacity_bytes
  );
  Ok(())
}

async fn enqueue(config: &Config, kind: ActionKind, payload: &str) -> Result<()> {
  let action = Action::from_parts(kind, parse_json(payload)?)?;
  let storage = open_storage(config)?;
  let queue = ActionQueue::load(storage).await;
  let id = queue.enqueue(action).await;
  println!("{}", id);
  Ok(())
}

async fn drain(config: &Config) -> Result<()> {
  let online = HttpProbe::new(config.health_url()?, config.probe_interval())
    .check()
    .await;
  let coordinator = build_coordinator(config, NetworkMonitor::new(online)).await?;
  let report = coordinator.drain().await;
  println!("{}", format_drain_report(&report));
  Ok(())
}

async fn cache(config: &Config, cmd: CacheCommand) -> Result<()> {
  let storage = open_storage(config)?;
  let cache = open_cache(config, &storage);

  match cmd {
    CacheCommand::Get { key } => match cache.get::<Value>(&key).await {
      Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
      None => return Err(eyre!("No live entry for {}", key)),
    },
    CacheCommand::Put { key, value, ttl } => {
      let value = parse_json(&value)?;
      match ttl {
        Some(secs) => {
          let ttl = chrono::Duration::try_seconds(secs)
            .ok_or_else(|| eyre!("--ttl {} is out of range", secs))?;
          cache.put(&key, &value, ttl).await
        }
        None => cache.put_default(&key, &value).await,
      }
    }
    CacheCommand::Remove { key } => cache.remove(&key).await,
    CacheCommand::Clear => cache.clear().await,
    CacheCommand::Cleanup => {
      let report = cache.cleanup().await;
      println!(
        "expired {}, evicted {}, corrupt {}, {} bytes remaining",
        report.expired, report.evicted, report.corrupt, report.remaining_bytes
      );
    }
  }
  Ok(())
}

async fn queue(config: &Config, cmd: QueueCommand) -> Result<()> {
  let queue = ActionQueue::load(open_storage(config)?).await;

  match cmd {
    QueueCommand::List => {
      for pending in queue.pending() {
        println!(
          "{}  {:<32} attempts={}  {}",
          pending.id,
          pending.kind().as_str(),
          pending.attempt_count,
          pending.enqueued_at.to_rfc3339()
        );
      }
    }
    QueueCommand::Clear => {
      let count = queue.size();
      queue.clear().await;
      println!("Removed {} pending action(s)", count);
    }
  }
  Ok(())
}

fn token(config: &Config, cmd: TokenCommand) -> Result<()> {
  let store = open_secrets(config)?;

  match cmd {
    TokenCommand::Set { token } => {
      let token = match token {
        Some(token) => token,
        None => {
          let mut line = String::new();
          std::io::stdin().lock().read_line(&mut line)?;
          line.trim().to_string()
        }
      };
      if token.is_empty() {
        return Err(eyre!("Token must not be empty"));
      }
      store.set(TOKEN_KEY, &token)?;
      println!("Token stored");
    }
    TokenCommand::Clear => {
      store.delete(TOKEN_KEY)?;
      println!("Token removed");
    }
  }
  Ok(())
}

async fn run(config: &Config) -> Result<()> {
  // Start offline so the first successful probe is an edge and drains
  // whatever was queued before startup.
  let monitor = NetworkMonitor::new(false);
  let coordinator = build_coordinator(config, monitor.clone()).await?;

  let mut reports = coordinator.subscribe_reports();
  let printer = tokio::spawn(async move {
    while let Ok(report) = reports.recv().await {
      if report.total() > 0 {
        println!("{}", format_drain_report(&report));
      }
    }
  });

  let (handle, task) = Arc::clone(&coordinator).spawn();
  let probe = HttpProbe::new(config.health_url()?, config.probe_interval());
  let watcher = monitor.attach(probe.into_stream());

  info!(pending = coordinator.queue().size(), "offsync running");
  println!("Watching {} (Ctrl-C to stop)", config.health_url()?);

  tokio::signal::ctrl_c().await?;

  watcher.abort();
  handle.shutdown().await;
  task.await?;
  printer.abort();
  Ok(())
}
