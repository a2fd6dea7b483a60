use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::DisplaySink;

const DEFAULT_LOG_EVERY: u64 = 30;

/// Display for machines without a screen.
///
/// Frames are counted and optionally the latest one is written to a PNG on
/// close. There is no keyboard: once the stop flag is raised (usually from a
/// Ctrl-C handler) `poll_key` reports the quit key.
pub struct HeadlessDisplay {
    quit_key: char,
    stop: Arc<AtomicBool>,
    snapshot_path: Option<PathBuf>,
    last_frame: Option<RgbImage>,
    frames_shown: u64,
    log_every: u64,
    closed: bool,
}

impl HeadlessDisplay {
    pub fn new(quit_key: char) -> Self {
        Self {
            quit_key,
            stop: Arc::new(AtomicBool::new(false)),
            snapshot_path: None,
            last_frame: None,
            frames_shown: 0,
            log_every: DEFAULT_LOG_EVERY,
            closed: false,
        }
    }

    /// Write the last shown frame to `path` when the display closes.
    pub fn with_snapshot(mut self, path: PathBuf) -> Self {
        self.snapshot_path = Some(path);
        self
    }

    pub fn with_log_every(mut self, frames: u64) -> Self {
        self.log_every = frames.max(1);
        self
    }

    /// Handle that makes the next `poll_key` return the quit key.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }

    pub fn last_frame(&self) -> Option<&RgbImage> {
        self.last_frame.as_ref()
    }
}

impl DisplaySink for HeadlessDisplay {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn show(&mut self, image: &RgbImage) -> Result<()> {
        self.frames_shown += 1;
        if self.frames_shown % self.log_every == 0 {
            log::debug!(
                "HeadlessDisplay: {} frames shown ({}x{})",
                self.frames_shown,
                image.width(),
                image.height()
            );
        }
        if self.snapshot_path.is_some() {
            self.last_frame = Some(image.clone());
        }
        Ok(())
    }

    fn poll_key(&mut self) -> Result<Option<char>> {
        if self.stop.load(Ordering::SeqCst) {
            Ok(Some(self.quit_key))
        } else {
            Ok(None)
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let (Some(path), Some(frame)) = (&self.snapshot_path, &self.last_frame) {
            frame
                .save_with_format(path, ImageFormat::Png)
                .with_context(|| format!("failed to write snapshot {}", path.display()))?;
            log::info!("HeadlessDisplay: wrote snapshot {}", path.display());
        }
        log::info!("HeadlessDisplay: closed after {} frames", self.frames_shown);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn stop_flag_reports_quit_key() -> Result<()> {
        let mut display = HeadlessDisplay::new('q');
        assert_eq!(display.poll_key()?, None);
        display.stop_handle().store(true, Ordering::SeqCst);
        assert_eq!(display.poll_key()?, Some('q'));
        Ok(())
    }

    #[test]
    fn snapshot_is_written_on_close() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("last.png");
        let mut display = HeadlessDisplay::new('q').with_snapshot(path.clone());
        display.show(&RgbImage::from_pixel(8, 6, Rgb([1, 2, 3])))?;
        display.show(&RgbImage::from_pixel(8, 6, Rgb([7, 8, 9])))?;
        display.close()?;
        display.close()?;

        let saved = image::open(&path)?.to_rgb8();
        assert_eq!(saved.dimensions(), (8, 6));
        assert_eq!(*saved.get_pixel(0, 0), Rgb([7, 8, 9]));
        assert_eq!(display.frames_shown(), 2);
        Ok(())
    }

    #[test]
    fn snapshot_path_without_extension_is_png() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("last");
        let mut display = HeadlessDisplay::new('q').with_snapshot(path.clone());
        display.show(&RgbImage::from_pixel(5, 3, Rgb([40, 50, 60])))?;
        display.close()?;

        let bytes = std::fs::read(&path)?;
        assert_eq!(image::guess_format(&bytes)?, ImageFormat::Png);
        let saved = image::load_from_memory_with_format(&bytes, ImageFormat::Png)?.to_rgb8();
        assert_eq!(saved.dimensions(), (5, 3));
        assert_eq!(*saved.get_pixel(4, 2), Rgb([40, 50, 60]));
        Ok(())
    }

    #[test]
    fn no_snapshot_keeps_no_frames() -> Result<()> {
        let mut display = HeadlessDisplay::new('q');
        display.show(&RgbImage::new(4, 4))?;
        assert!(display.last_frame().is_none());
        display.close()?;
        Ok(())
    }
}
