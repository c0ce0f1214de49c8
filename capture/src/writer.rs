//! Persisting frames – JPEG encoding to a staging file, then an atomic
//! rename onto the final name.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tracing::{debug, warn};

use scanshot_common::error::CaptureError;

/// Where encoded frames go.
pub trait FrameWriter: Send + Sync {
    /// Encode `frame` to `staged` and return the encoded size in bytes.
    fn write(&self, frame: &RgbImage, staged: &Path) -> Result<u64, CaptureError>;

    /// Move a staged file onto `target`, replacing whatever is there.
    fn promote(&self, staged: &Path, target: &Path) -> Result<(), CaptureError>;

    /// Drop a staged file that lost to a better one.
    fn discard(&self, staged: &Path);

    /// Whether a promoted image currently sits at `target`.
    fn is_saved(&self, target: &Path) -> bool {
        target.exists()
    }
}

/// Baseline JPEG at a fixed quality.
#[derive(Debug, Clone)]
pub struct JpegWriter {
    pub quality: u8,
}

impl Default for JpegWriter {
    fn default() -> Self {
        JpegWriter { quality: 100 }
    }
}

impl FrameWriter for JpegWriter {
    fn write(&self, frame: &RgbImage, staged: &Path) -> Result<u64, CaptureError> {
        if let Some(parent) = staged.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CaptureError::write_failure(staged, e))?;
        }

        let file = File::create(staged).map_err(|e| CaptureError::write_failure(staged, e))?;
        let mut out = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode_image(frame)
            .map_err(|e| CaptureError::write_failure(staged, e))?;
        out.flush().map_err(|e| CaptureError::write_failure(staged, e))?;
        drop(out);

        if !staged.exists() {
            return Err(CaptureError::write_failure(staged, "file missing after encode"));
        }
        let size = std::fs::metadata(staged)
            .map_err(|e| CaptureError::write_failure(staged, e))?
            .len();
        debug!("Encoded {}x{} frame → {} ({size} bytes)", frame.width(), frame.height(), staged.display());
        Ok(size)
    }

    fn promote(&self, staged: &Path, target: &Path) -> Result<(), CaptureError> {
        if !staged.exists() {
            return Err(CaptureError::write_failure(staged, "staged file missing"));
        }
        match std::fs::rename(staged, target) {
            Ok(()) => Ok(()),
            // Some platforms refuse to rename over an existing file.
            Err(_) if target.exists() => {
                std::fs::remove_file(target).map_err(|e| CaptureError::write_failure(target, e))?;
                std::fs::rename(staged, target).map_err(|e| CaptureError::write_failure(target, e))
            }
            Err(e) => Err(CaptureError::write_failure(target, e)),
        }
    }

    fn discard(&self, staged: &Path) {
        if let Err(e) = std::fs::remove_file(staged) {
            warn!("Cannot remove staged {}: {e}", staged.display());
        }
    }
}
