//! Capture engine – tries each candidate stream in order, keeps the
//! sharpest frame per stream and the largest encoded image overall, and
//! records the winner in the history.
//!
//! The engine takes no locks: callers must not run two captures on the
//! same engine at once.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{debug, error, info, warn};

use scanshot_common::config::Config;
use scanshot_common::error::CaptureError;
use scanshot_common::history::History;
use scanshot_common::protocol::{CaptureDetails, CaptureResult};
use scanshot_common::record::{capture_filename, size_kb, CaptureRecord, CaptureStamp, QualityLevel};

use crate::connection::Connection;
use crate::sharpness;
use crate::stream::{FrameSource, StreamLocation, StreamOpener};
use crate::writer::FrameWriter;

/// Barcode used by [`CaptureEngine::self_test`].
pub const TEST_BARCODE: &str = "TEST";

/// Limits of the acquisition loop and the fallback loop.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Wall-clock budget per stream.
    pub deadline: Duration,
    /// Pause between frame reads.
    pub throttle: Duration,
    /// Frames to read before an early exit is allowed.
    pub min_frames: u32,
    /// Best score that, with `min_frames` read, ends the loop early.
    pub sharpness_threshold: f64,
    /// Encoded size that ends the fallback loop early.
    pub high_quality_bytes: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        CaptureSettings {
            deadline: Duration::from_secs(15),
            throttle: Duration::from_millis(100),
            min_frames: 10,
            sharpness_threshold: 100.0,
            high_quality_bytes: 200 * 1024,
        }
    }
}

impl CaptureSettings {
    pub fn from_config(config: &Config) -> Self {
        CaptureSettings {
            deadline: config.capture_timeout(),
            throttle: config.frame_interval(),
            min_frames: config.min_frames,
            sharpness_threshold: config.sharpness_threshold,
            high_quality_bytes: config.high_quality_bytes,
        }
    }
}

/// Result of reading one stream.
#[derive(Default)]
pub struct FrameScan {
    pub frames: u32,
    pub best: Option<RgbImage>,
    pub best_score: f64,
}

/// Read frames until the deadline, a failed read, or an early exit, and
/// keep the sharpest one.
pub fn scan_stream(source: &mut dyn FrameSource, settings: &CaptureSettings) -> FrameScan {
    let started = Instant::now();
    let mut scan = FrameScan::default();

    while started.elapsed() < settings.deadline {
        let frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                warn!("Stream ended after {} frame(s)", scan.frames);
                break;
            }
            Err(e) => {
                warn!("Frame read failed after {} frame(s): {e}", scan.frames);
                break;
            }
        };
        scan.frames += 1;

        let score = sharpness::score(&frame);
        if scan.best.is_none() || score > scan.best_score {
            debug!("Frame {} is sharpest so far: {score:.2}", scan.frames);
            scan.best_score = score;
            scan.best = Some(frame);
        }

        if scan.frames >= settings.min_frames && scan.best_score > settings.sharpness_threshold {
            debug!("Sharp enough after {} frames, stopping early", scan.frames);
            break;
        }

        std::thread::sleep(settings.throttle);
    }

    scan
}

/// An encoded frame from one candidate, waiting in its staging file.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub location: StreamLocation,
    pub staged: PathBuf,
    pub file_size: u64,
    pub frames: u32,
    pub score: f64,
}

/// Best-by-size fold over candidate attempts.
#[derive(Debug, Default)]
pub struct BestSoFar {
    best: Option<Attempt>,
}

impl BestSoFar {
    /// Whether an attempt of `file_size` bytes would replace the current
    /// best.  Ties keep the earlier (higher-priority) attempt.
    pub fn beats(&self, file_size: u64) -> bool {
        self.best.as_ref().map_or(true, |best| file_size > best.file_size)
    }

    /// Offer an attempt; returns `true` if it is now the best.
    pub fn offer(&mut self, attempt: Attempt) -> bool {
        if !self.beats(attempt.file_size) {
            return false;
        }
        self.best = Some(attempt);
        true
    }

    pub fn best(&self) -> Option<&Attempt> {
        self.best.as_ref()
    }

    pub fn into_best(self) -> Option<Attempt> {
        self.best
    }
}

/// Drives captures for one connected camera.
pub struct CaptureEngine {
    connection: Arc<dyn Connection>,
    opener: Box<dyn StreamOpener>,
    writer: Box<dyn FrameWriter>,
    history: Arc<dyn History>,
    save_dir: PathBuf,
    settings: CaptureSettings,
    last_stamp: AtomicI64,
}

impl CaptureEngine {
    pub fn new(
        connection: Arc<dyn Connection>,
        opener: Box<dyn StreamOpener>,
        writer: Box<dyn FrameWriter>,
        history: Arc<dyn History>,
        save_dir: impl Into<PathBuf>,
        settings: CaptureSettings,
    ) -> Self {
        CaptureEngine {
            connection,
            opener,
            writer,
            history,
            save_dir: save_dir.into(),
            settings,
            last_stamp: AtomicI64::new(i64::MIN),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Capture a frame labelled with `barcode`.  Never fails: errors come
    /// back as an unsuccessful [`CaptureResult`].
    pub fn capture(&self, barcode: &str, description: &str) -> CaptureResult {
        let barcode = barcode.trim();
        match self.try_capture(barcode, description) {
            Ok(details) => {
                info!(
                    "Capture {} saved: {} ({}KB, {}, {} frames, sharpness {:.2})",
                    details.barcode,
                    details.filename,
                    details.file_size_kb,
                    details.quality,
                    details.frames_captured,
                    details.best_frame_quality
                );
                CaptureResult::success(details)
            }
            Err(e) => {
                error!("Capture {barcode:?} failed: {e}");
                CaptureResult::failure(&e)
            }
        }
    }

    /// Capture with the fixed test barcode.
    pub fn self_test(&self) -> CaptureResult {
        self.capture(TEST_BARCODE, "camera self-test")
    }

    fn try_capture(&self, barcode: &str, description: &str) -> Result<CaptureDetails, CaptureError> {
        if barcode.is_empty() {
            return Err(CaptureError::InvalidInput);
        }
        if !self.connection.is_connected() {
            return Err(CaptureError::NotConnected);
        }

        let stamp = self.next_stamp();
        let target = self.save_dir.join(capture_filename(barcode, &stamp));
        let locations = StreamLocation::candidates(self.connection.target());
        info!("Capture {barcode} started → {}", target.display());

        let mut best = BestSoFar::default();
        for location in &locations {
            info!("Trying {location}");
            let attempt = match self.attempt(location, &stamp) {
                Ok(a) => a,
                Err(e) => {
                    warn!("{} failed: {e}", location.method());
                    continue;
                }
            };
            info!("{} produced {} bytes", location.method(), attempt.file_size);

            if !best.beats(attempt.file_size) {
                self.writer.discard(&attempt.staged);
                continue;
            }
            if let Err(e) = self.writer.promote(&attempt.staged, &target) {
                warn!("{} failed: {e}", location.method());
                self.writer.discard(&attempt.staged);
                if best.best().is_some() && !self.writer.is_saved(&target) {
                    warn!("Previous best at {} was lost", target.display());
                    best = BestSoFar::default();
                }
                continue;
            }
            best.offer(attempt);

            let size = best.best().map(|a| a.file_size).unwrap_or_default();
            if size > self.settings.high_quality_bytes {
                info!("{} is high quality ({size} bytes), skipping remaining streams", location.method());
                break;
            }
        }

        let best = best.into_best().ok_or(CaptureError::AllCandidatesFailed {
            attempted: locations.len(),
        })?;
        Ok(self.finish(barcode, description, &target, &stamp, best))
    }

    /// Open one location, scan it, and stage the sharpest frame.
    fn attempt(&self, location: &StreamLocation, stamp: &CaptureStamp) -> Result<Attempt, CaptureError> {
        let scan = {
            let mut source = self.opener.open(location)?;
            scan_stream(source.as_mut(), &self.settings)
            // `source` dropped here: the stream is released before encoding
        };

        let frame = scan.best.ok_or_else(|| CaptureError::StreamUnavailable {
            location: location.to_string(),
            reason: "no frames received".into(),
        })?;
        info!(
            "{}: {} frame(s) read, keeping the sharpest ({:.2})",
            location.method(),
            scan.frames,
            scan.best_score
        );

        let staged = self
            .save_dir
            .join(format!("temp_cv_{}_{}.jpg", stamp.millis(), location.ordinal));
        let file_size = self.writer.write(&frame, &staged)?;

        Ok(Attempt {
            location: location.clone(),
            staged,
            file_size,
            frames: scan.frames,
            score: scan.best_score,
        })
    }

    fn finish(
        &self,
        barcode: &str,
        description: &str,
        target: &Path,
        stamp: &CaptureStamp,
        best: Attempt,
    ) -> CaptureDetails {
        let method = best.location.method();
        let record = CaptureRecord::new(
            barcode,
            target,
            stamp,
            description,
            &self.connection.target().ip,
            &method,
            best.file_size,
        );
        // The image is already on disk; a lost history entry is logged
        // but does not fail the capture.
        if let Err(e) = self.history.append(&record) {
            error!("Cannot record capture {}: {e:#}", record.filename);
        }

        CaptureDetails {
            filename: record.filename.clone(),
            file_path: record.file_path.clone(),
            file_size: best.file_size,
            file_size_kb: size_kb(best.file_size),
            barcode: barcode.to_string(),
            quality: QualityLevel::from_file_size(best.file_size),
            method,
            frames_captured: best.frames,
            best_frame_quality: (best.score * 100.0).round() / 100.0,
            info: record,
        }
    }

    /// Millisecond stamps that strictly increase across calls, even when
    /// the clock has not moved.
    fn next_stamp(&self) -> CaptureStamp {
        let now = CaptureStamp::now().millis();
        let prev = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or(now);
        CaptureStamp::from_millis(now.max(prev.saturating_add(1)))
    }
}
