//! Result payload and HTTP API types shared by the CLI and the server.

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, ErrorKind};
use crate::record::{CaptureRecord, QualityLevel};

/// Outcome of a capture call. Failures are values, never errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(flatten)]
    pub details: Option<CaptureDetails>,
}

/// What a successful capture produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureDetails {
    pub filename: String,
    pub file_path: String,
    pub file_size: u64,
    pub file_size_kb: f64,
    pub barcode: String,
    pub quality: QualityLevel,
    pub method: String,
    pub frames_captured: u32,
    /// Laplacian variance of the saved frame, two decimals.
    pub best_frame_quality: f64,
    pub info: CaptureRecord,
}

impl CaptureResult {
    pub fn success(details: CaptureDetails) -> Self {
        CaptureResult {
            success: true,
            message: format!("Captured via {}", details.method),
            error: None,
            details: Some(details),
        }
    }

    pub fn failure(err: &CaptureError) -> Self {
        CaptureResult {
            success: false,
            message: err.to_string(),
            error: Some(err.kind()),
            details: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub ip: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub barcode: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub total: usize,
    pub records: Vec<CaptureRecord>,
}

/// Health-check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_payload_shape() {
        let result = CaptureResult::failure(&CaptureError::NotConnected);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "not_connected");
        assert!(json.get("filename").is_none());
    }

    #[test]
    fn test_success_payload_is_flat() {
        let details = CaptureDetails {
            filename: "CV_A_20240101_000000_000.jpg".into(),
            file_path: "/tmp/CV_A_20240101_000000_000.jpg".into(),
            file_size: 2048,
            file_size_kb: 2.0,
            barcode: "A".into(),
            quality: QualityLevel::Low,
            method: "rtsp_1".into(),
            frames_captured: 12,
            best_frame_quality: 321.5,
            info: CaptureRecord::default(),
        };
        let json = serde_json::to_value(CaptureResult::success(details)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["method"], "rtsp_1");
        assert_eq!(json["quality"], "low");
        assert!(json.get("error").is_none());
    }
}
