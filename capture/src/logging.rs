//! Log setup – stderr plus a daily log file under the log directory.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// `scanshot_YYYYMMDD.log` inside `log_dir`.
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(format!(
        "scanshot_{}.log",
        chrono::Local::now().format("%Y%m%d")
    ))
}

/// Install the global subscriber.
///
/// Returns the log file in use, or `None` when it could not be opened and
/// only stderr is logged.
pub fn init(log_dir: &Path) -> Option<PathBuf> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    };

    let path = log_file_path(log_dir);
    let file = std::fs::create_dir_all(log_dir)
        .and_then(|_| OpenOptions::new().create(true).append(true).open(&path));

    match file {
        Ok(file) => {
            tracing_subscriber::registry()
                .with(filter())
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .init();
            Some(path)
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .init();
            tracing::warn!("Cannot open log file {}: {e} – logging to stderr only", path.display());
            None
        }
    }
}
