//! Log setup for the `offsync` binary.
//!
//! Logs go to a daily rolling file under the data directory so they never
//! interleave with command output. The filter comes from `OFFSYNC_LOG`
//! (e.g. `OFFSYNC_LOG=offsync=debug`) and defaults to `info`.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "OFFSYNC_LOG";
const LOG_FILE_PREFIX: &str = "offsync.log";

/// Default log directory: `<data_dir>/offsync/logs`.
pub fn default_log_dir() -> Option<PathBuf> {
  dirs::data_dir().map(|p| p.join("offsync").join("logs"))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes buffered lines.
pub fn init(log_dir: Option<PathBuf>) -> Result<WorkerGuard> {
  let dir = log_dir
    .or_else(default_log_dir)
    .ok_or_else(|| eyre!("Could not determine log directory"))?;
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
    .try_init()
    .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

  Ok(guard)
}
