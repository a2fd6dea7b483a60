use std::time::{Duration, Instant};

/// Per-frame rate derived from how long one frame took to process.
///
/// The meter is instantaneous: each reading only reflects the latest
/// frame. `mean` tracks the running average for end-of-run summaries.
#[derive(Debug, Default)]
pub struct FpsMeter {
    started: Option<Instant>,
    last: f32,
    total: Duration,
    frames: u64,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of a frame's processing.
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Close the current frame and return its rate. Returns 0 without a
    /// matching `start`.
    pub fn stop(&mut self) -> f32 {
        let Some(started) = self.started.take() else {
            return 0.0;
        };
        self.record(started.elapsed())
    }

    /// Record an externally measured frame duration.
    pub fn record(&mut self, elapsed: Duration) -> f32 {
        self.last = fps_from_elapsed(elapsed);
        self.total += elapsed;
        self.frames += 1;
        self.last
    }

    pub fn last(&self) -> f32 {
        self.last
    }

    /// Frames per second over every recorded frame.
    pub fn mean(&self) -> f32 {
        fps_from_elapsed(self.total) * self.frames as f32
    }
}

/// Frames per second for a single frame that took `elapsed`. Zero elapsed
/// time reports 0 rather than infinity.
pub fn fps_from_elapsed(elapsed: Duration) -> f32 {
    let secs = elapsed.as_secs_f32();
    if secs > 0.0 {
        1.0 / secs
    } else {
        0.0
    }
}

/// Overlay text, truncated to a whole number.
pub fn fps_text(fps: f32) -> String {
    format!("FPS: {}", fps.max(0.0) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_elapsed_reports_zero() {
        assert_eq!(fps_from_elapsed(Duration::ZERO), 0.0);
    }

    #[test]
    fn rate_is_reciprocal_of_frame_time() {
        assert!((fps_from_elapsed(Duration::from_millis(50)) - 20.0).abs() < 1e-3);
    }

    #[test]
    fn text_truncates() {
        assert_eq!(fps_text(29.97), "FPS: 29");
        assert_eq!(fps_text(0.0), "FPS: 0");
    }

    #[test]
    fn meter_tracks_last_and_mean() {
        let mut meter = FpsMeter::new();
        assert_eq!(meter.stop(), 0.0);
        meter.record(Duration::from_millis(100));
        meter.record(Duration::from_millis(300));
        assert!((meter.last() - 3.333).abs() < 1e-2);
        assert!((meter.mean() - 5.0).abs() < 1e-3);
    }
}
