//! Configuration parsing – reads a KEY=VALUE file.
//!
//! The same file drives the CLI and the HTTP server; command-line flags
//! may override the camera address and credentials afterwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // ── camera ───────────────────────────────────────────────────────
    pub camera_ip: String,
    /// HTTP management port.
    pub camera_port: u16,
    pub camera_user: String,
    pub camera_password: String,
    pub rtsp_port: u16,
    /// `-rtsp_transport` handed to ffmpeg ("tcp" or "udp").
    pub rtsp_transport: String,
    pub ffmpeg_bin: String,

    // ── directories ──────────────────────────────────────────────────
    pub data_dir: PathBuf,
    pub save_dir: PathBuf,
    pub log_dir: PathBuf,

    // ── capture tuning ───────────────────────────────────────────────
    pub connect_timeout_secs: u64,
    pub capture_timeout_secs: u64,
    pub frame_interval_ms: u64,
    pub min_frames: u32,
    pub sharpness_threshold: f64,
    /// Encoded size above which a capture ends the fallback loop early.
    pub high_quality_bytes: u64,
    pub frame_width: u32,
    pub frame_height: u32,

    // ── presentation ─────────────────────────────────────────────────
    pub history_limit: usize,
    pub listen_addr: String,
}

impl Config {
    /// Default config path.
    pub fn default_path() -> &'static str {
        "/etc/scanshot/scanshot.conf"
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        from_map(&HashMap::new())
    }
}

/// Parse a `KEY=VALUE` configuration file.
///
/// Lines starting with `#` are comments.  Values may be optionally
/// double-quoted.  Unknown keys are silently ignored.
pub fn load(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config: {}", path.display()))?;

    Ok(from_map(&parse_conf(&text)))
}

/// Like [`load`], but a missing file yields the defaults.
///
/// Returns whether the file was actually found so the caller can log it
/// once logging is up.
pub fn load_or_default(path: &Path) -> Result<(Config, bool)> {
    if !path.exists() {
        return Ok((Config::default(), false));
    }
    load(path).map(|c| (c, true))
}

fn from_map(map: &HashMap<String, String>) -> Config {
    let get = |key: &str| -> Option<String> { map.get(key).cloned() };
    let get_u64 = |key: &str, default: u64| -> u64 {
        get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    };
    let get_u16 = |key: &str, default: u16| -> u16 {
        get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    };
    let get_u32 = |key: &str, default: u32| -> u32 {
        get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    };

    let data_dir = PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "AppData".into()));
    let save_dir = get("SAVE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("captured_images"));
    let log_dir = get("LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("logs"));

    Config {
        camera_ip: get("CAMERA_IP")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "192.168.1.64".into()),
        camera_port: get_u16("CAMERA_PORT", 80),
        camera_user: get("CAMERA_USER").unwrap_or_else(|| "admin".into()),
        camera_password: get("CAMERA_PASSWORD").unwrap_or_default(),
        rtsp_port: get_u16("RTSP_PORT", 554),
        rtsp_transport: get("RTSP_TRANSPORT")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "tcp".into()),
        ffmpeg_bin: get("FFMPEG_BIN")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "ffmpeg".into()),

        data_dir,
        save_dir,
        log_dir,

        connect_timeout_secs: get_u64("CONNECT_TIMEOUT_SECS", 10),
        capture_timeout_secs: get_u64("CAPTURE_TIMEOUT_SECS", 15),
        frame_interval_ms: get_u64("FRAME_INTERVAL_MS", 100),
        min_frames: get_u32("MIN_FRAMES", 10),
        sharpness_threshold: get("SHARPNESS_THRESHOLD")
            .and_then(|v| v.parse().ok())
            .unwrap_or(100.0),
        high_quality_bytes: get_u64("HIGH_QUALITY_BYTES", 200 * 1024),
        frame_width: get_u32("FRAME_WIDTH", 1920),
        frame_height: get_u32("FRAME_HEIGHT", 1080),

        history_limit: get("HISTORY_LIMIT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(50),
        listen_addr: get("LISTEN_ADDR").unwrap_or_else(|| "127.0.0.1:8090".into()),
    }
}

/// Parse `KEY=VALUE` lines into a map, stripping optional double-quotes.
fn parse_conf(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            let key = key.trim();
            let val = val.trim().trim_matches('"');
            map.insert(key.to_string(), val.to_string());
        }
    }
    map
}

// ─── tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_conf() {
        let text = r#"
# comment
CAMERA_IP=10.0.0.7
CAMERA_PASSWORD="p@ss=word"
RTSP_TRANSPORT = udp
LISTEN_ADDR=0.0.0.0:9090
"#;
        let map = parse_conf(text);
        assert_eq!(map["CAMERA_IP"], "10.0.0.7");
        assert_eq!(map["CAMERA_PASSWORD"], "p@ss=word");
        assert_eq!(map["RTSP_TRANSPORT"], "udp");
        assert_eq!(map["LISTEN_ADDR"], "0.0.0.0:9090");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.camera_port, 80);
        assert_eq!(config.rtsp_port, 554);
        assert_eq!(config.capture_timeout(), Duration::from_secs(15));
        assert_eq!(config.frame_interval(), Duration::from_millis(100));
        assert_eq!(config.min_frames, 10);
        assert_eq!(config.high_quality_bytes, 204_800);
        assert_eq!(config.save_dir, PathBuf::from("AppData/captured_images"));
        assert_eq!(config.log_dir, PathBuf::from("AppData/logs"));
    }

    #[test]
    fn test_data_dir_drives_subdirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanshot.conf");
        std::fs::write(&path, "DATA_DIR=/srv/scan\nLOG_DIR=/var/log/scan\n").unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.save_dir, PathBuf::from("/srv/scan/captured_images"));
        assert_eq!(config.log_dir, PathBuf::from("/var/log/scan"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, found) = load_or_default(&dir.path().join("absent.conf")).unwrap();
        assert!(!found);
        assert_eq!(config.camera_user, "admin");
    }
}
