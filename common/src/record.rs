//! Capture records, quality levels and the naming scheme for saved images.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

/// Coarse image quality, derived only from the encoded file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityLevel {
    #[default]
    Low,
    Normal,
    Standard,
    Hd,
    UltraHd,
}

impl QualityLevel {
    /// Classify an encoded image by its size in bytes.
    pub fn from_file_size(bytes: u64) -> Self {
        const KB: u64 = 1024;
        match bytes {
            b if b >= 500 * KB => QualityLevel::UltraHd,
            b if b >= 200 * KB => QualityLevel::Hd,
            b if b >= 100 * KB => QualityLevel::Standard,
            b if b >= 50 * KB => QualityLevel::Normal,
            _ => QualityLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLevel::UltraHd => "ultra-hd",
            QualityLevel::Hd => "hd",
            QualityLevel::Standard => "standard",
            QualityLevel::Normal => "normal",
            QualityLevel::Low => "low",
        }
    }
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Metadata for one successful capture, as stored in the history file.
///
/// Every field defaults so that older or hand-edited history files still
/// load.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureRecord {
    pub barcode: String,
    pub filename: String,
    pub file_path: String,
    /// `YYYYMMDD_HHMMSS_mmm`; sorts chronologically as a plain string.
    pub timestamp: String,
    pub description: String,
    pub camera_ip: String,
    pub capture_time: String,
    pub capture_method: String,
    pub file_size: u64,
    pub file_size_kb: f64,
    pub quality: QualityLevel,
}

impl CaptureRecord {
    /// Build a record for an image already written to `file_path`.
    pub fn new(
        barcode: &str,
        file_path: &std::path::Path,
        stamp: &CaptureStamp,
        description: &str,
        camera_ip: &str,
        capture_method: &str,
        file_size: u64,
    ) -> Self {
        CaptureRecord {
            barcode: barcode.to_string(),
            filename: file_path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
            file_path: file_path.display().to_string(),
            timestamp: stamp.compact(),
            description: description.to_string(),
            camera_ip: camera_ip.to_string(),
            capture_time: Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            capture_method: capture_method.to_string(),
            file_size,
            file_size_kb: size_kb(file_size),
            quality: QualityLevel::from_file_size(file_size),
        }
    }
}

impl std::fmt::Display for CaptureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Capture({}, {}, {}KB, {})",
            self.barcode, self.filename, self.file_size_kb, self.quality
        )
    }
}

/// Size in KiB rounded to one decimal place.
pub fn size_kb(bytes: u64) -> f64 {
    (bytes as f64 / 1024.0 * 10.0).round() / 10.0
}

/// Millisecond-precision capture instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CaptureStamp {
    millis: i64,
}

impl CaptureStamp {
    pub fn from_millis(millis: i64) -> Self {
        CaptureStamp { millis }
    }

    pub fn now() -> Self {
        Self::from_millis(Local::now().timestamp_millis())
    }

    pub fn millis(&self) -> i64 {
        self.millis
    }

    fn local(&self) -> DateTime<Local> {
        Local
            .timestamp_millis_opt(self.millis)
            .single()
            .unwrap_or_else(Local::now)
    }

    /// `YYYYMMDD_HHMMSS_mmm`, used in filenames and as the history sort key.
    pub fn compact(&self) -> String {
        self.local().format("%Y%m%d_%H%M%S_%3f").to_string()
    }
}

/// `CV_<barcode>_<stamp>.jpg`, with characters that are illegal in file
/// names replaced by `_`.
pub fn capture_filename(barcode: &str, stamp: &CaptureStamp) -> String {
    let safe: String = barcode
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("CV_{safe}_{}.jpg", stamp.compact())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_thresholds() {
        assert_eq!(QualityLevel::from_file_size(0), QualityLevel::Low);
        assert_eq!(QualityLevel::from_file_size(50 * 1024 - 1), QualityLevel::Low);
        assert_eq!(QualityLevel::from_file_size(50 * 1024), QualityLevel::Normal);
        assert_eq!(QualityLevel::from_file_size(100 * 1024), QualityLevel::Standard);
        assert_eq!(QualityLevel::from_file_size(200 * 1024), QualityLevel::Hd);
        assert_eq!(QualityLevel::from_file_size(500 * 1024), QualityLevel::UltraHd);
        assert_eq!(QualityLevel::from_file_size(u64::MAX), QualityLevel::UltraHd);
    }

    #[test]
    fn test_quality_is_monotonic_in_size() {
        let mut prev = QualityLevel::from_file_size(0);
        for kb in (0..800u64).step_by(7) {
            let level = QualityLevel::from_file_size(kb * 1024 + 13);
            assert!(level >= prev, "{kb}KB classified {level} after {prev}");
            prev = level;
        }
    }

    #[test]
    fn test_quality_serializes_kebab_case() {
        let json = serde_json::to_string(&QualityLevel::UltraHd).unwrap();
        assert_eq!(json, "\"ultra-hd\"");
        let back: QualityLevel = serde_json::from_str("\"standard\"").unwrap();
        assert_eq!(back, QualityLevel::Standard);
    }

    #[test]
    fn test_size_kb_rounding() {
        assert_eq!(size_kb(0), 0.0);
        assert_eq!(size_kb(1024), 1.0);
        assert_eq!(size_kb(1536), 1.5);
        assert_eq!(size_kb(210_000), 205.1);
    }

    #[test]
    fn test_stamp_format_has_millis() {
        let s = CaptureStamp::now().compact();
        // YYYYMMDD_HHMMSS_mmm
        assert_eq!(s.len(), 19);
        assert_eq!(&s[8..9], "_");
        assert_eq!(&s[15..16], "_");
        assert!(s[16..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_stamps_one_milli_apart_differ() {
        let a = CaptureStamp::from_millis(1_700_000_000_000);
        let b = CaptureStamp::from_millis(1_700_000_000_001);
        assert_ne!(a.compact(), b.compact());
        assert!(a.compact() < b.compact());
    }

    #[test]
    fn test_filename_sanitises_barcode() {
        let stamp = CaptureStamp::from_millis(1_700_000_000_123);
        let name = capture_filename("AB/12:3", &stamp);
        assert!(name.starts_with("CV_AB_12_3_"));
        assert!(name.ends_with("_123.jpg"));
    }

    #[test]
    fn test_record_missing_fields_default() {
        let rec: CaptureRecord = serde_json::from_str(r#"{"barcode":"X1"}"#).unwrap();
        assert_eq!(rec.barcode, "X1");
        assert_eq!(rec.quality, QualityLevel::Low);
        assert_eq!(rec.file_size, 0);
    }
}
