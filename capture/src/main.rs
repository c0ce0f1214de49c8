//! scanshot – grabs a sharp still from a network camera for each scanned
//! barcode and keeps a JSON history of the captures.
//!
//! This binary:
//! 1. Reads configuration from `scanshot.conf` (defaults if absent)
//! 2. Checks the camera's management API (digest auth)
//! 3. Captures from the camera's RTSP streams via ffmpeg, or serves the
//!    same operations over HTTP.

mod connection;
mod engine;
mod logging;
mod server;
mod sharpness;
mod stream;
mod writer;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use scanshot_common::config::{self, Config};
use scanshot_common::history::{History, JsonHistory};
use scanshot_common::protocol::CaptureResult;

use connection::{CameraTarget, Connection, ConnectionManager};
use engine::{CaptureEngine, CaptureSettings};
use stream::FfmpegOpener;
use writer::JpegWriter;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Parser)]
#[command(name = "scanshot-capture", version, about = "Barcode-keyed network camera capture")]
struct Cli {
    /// Configuration file (KEY=VALUE).
    #[arg(short, long, default_value = Config::default_path())]
    config: PathBuf,

    /// Camera address, overriding CAMERA_IP.
    #[arg(long)]
    ip: Option<String>,

    /// HTTP management port, overriding CAMERA_PORT.
    #[arg(long)]
    port: Option<u16>,

    /// Camera user, overriding CAMERA_USER.
    #[arg(long)]
    user: Option<String>,

    /// Camera password, overriding CAMERA_PASSWORD.
    #[arg(long, env = "SCANSHOT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that the camera's management API answers.
    Connect,
    /// Capture one image labelled with a barcode.
    Capture {
        barcode: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Capture a test image.
    Test,
    /// Show the newest capture records.
    History {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Serve the HTTP API.
    Serve {
        #[arg(long)]
        listen: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── load config ──────────────────────────────────────────────────
    let (mut config, found) = config::load_or_default(&cli.config).context("Config load failed")?;
    if let Some(ip) = cli.ip {
        config.camera_ip = ip;
    }
    if let Some(port) = cli.port {
        config.camera_port = port;
    }
    if let Some(user) = cli.user {
        config.camera_user = user;
    }
    if let Some(password) = cli.password {
        config.camera_password = password;
    }

    let log_file = logging::init(&config.log_dir);
    info!("scanshot starting");
    if found {
        info!("Loaded config from {}", cli.config.display());
    } else {
        warn!("No config at {} – using defaults", cli.config.display());
    }
    if let Some(path) = log_file {
        info!("Logging to {}", path.display());
    }

    std::fs::create_dir_all(&config.save_dir).context("Cannot create image directory")?;

    match cli.command {
        Command::Connect => {
            let connection = connect(&config);
            println!(
                "{}",
                if connection.is_connected() { "connected" } else { "not connected" }
            );
            if !connection.is_connected() {
                std::process::exit(1);
            }
        }
        Command::Capture { barcode, description } => {
            check_dependencies(&config);
            let engine = build_engine(&config, connect(&config));
            report(engine.capture(&barcode, &description))?;
        }
        Command::Test => {
            check_dependencies(&config);
            let engine = build_engine(&config, connect(&config));
            report(engine.self_test())?;
        }
        Command::History { limit } => {
            print_history(&config, limit.unwrap_or(config.history_limit));
        }
        Command::Serve { listen } => {
            check_dependencies(&config);
            serve(config, listen)?;
        }
    }

    Ok(())
}

fn connect(config: &Config) -> Arc<ConnectionManager> {
    Arc::new(ConnectionManager::connect(
        CameraTarget::from_config(config),
        config.connect_timeout(),
    ))
}

/// Wire a capture engine to the real ffmpeg source, JPEG writer and
/// history file.
pub fn build_engine(config: &Config, connection: Arc<dyn Connection>) -> CaptureEngine {
    CaptureEngine::new(
        connection,
        Box::new(FfmpegOpener::from_config(config)),
        Box::new(JpegWriter::default()),
        Arc::new(JsonHistory::in_dir(&config.save_dir)),
        config.save_dir.clone(),
        CaptureSettings::from_config(config),
    )
}

fn check_dependencies(config: &Config) {
    match stream::check_ffmpeg(&config.ffmpeg_bin) {
        Ok(version) => info!("Using {version}"),
        Err(e) => warn!("ffmpeg unavailable ({e:#}) – captures will fail"),
    }
}

fn report(result: CaptureResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn print_history(config: &Config, limit: usize) {
    let history = JsonHistory::in_dir(&config.save_dir);
    let records = history.list(limit);

    println!(
        "{:<23}  {:<20}  {:<44}  {:>9}  {:<8}  {}",
        "CAPTURE TIME", "BARCODE", "FILE", "SIZE", "QUALITY", "METHOD"
    );
    for r in &records {
        println!(
            "{:<23}  {:<20}  {:<44}  {:>7}KB  {:<8}  {}",
            r.capture_time, r.barcode, r.filename, r.file_size_kb, r.quality, r.capture_method
        );
    }
    println!("Total: {} image(s), showing {}", history.count(), records.len());
}

fn serve(config: Config, listen: Option<String>) -> Result<()> {
    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::Relaxed);
        info!("Shutdown signal received");
    })
    .context("Cannot set Ctrl-C handler")?;

    // Connect up front with the configured camera; clients may reconnect
    // through the API.
    let engine = Arc::new(build_engine(&config, connect(&config)));
    let listen_addr = listen.unwrap_or_else(|| config.listen_addr.clone());

    let runtime = tokio::runtime::Runtime::new().context("Cannot start async runtime")?;
    runtime.block_on(server::run(config, Some(engine), &listen_addr, &SHUTDOWN))?;

    info!("scanshot stopped");
    Ok(())
}
