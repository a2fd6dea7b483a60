//! The inspection loop.
//!
//! One iteration: capture a frame, segment it, draw contours and labels,
//! stamp the frame rate, show the result and poll the keyboard. Frames are
//! processed strictly one at a time and nothing is carried between them
//! except counters.
//!
//! The loop ends when the camera stops delivering, when the quit key is
//! pressed, or when an optional frame limit is reached. Inference and display
//! failures are fatal. The display is closed on every exit path.

use anyhow::{Context, Result};

use crate::display::DisplaySink;
use crate::ingest::FrameSource;
use crate::overlay::{annotate, draw_fps, FpsMeter, OverlayStyle};
use crate::segment::SegmenterBackend;

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The camera failed to produce a frame.
    SourceEnded,
    /// The operator pressed the quit key.
    QuitKey,
    /// The configured frame limit was reached.
    FrameLimit,
}

/// Result of a single iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Stop(StopReason),
}

/// Totals for a finished run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub instances: u64,
    pub stop_reason: StopReason,
    pub mean_fps: f32,
}

pub struct Inspector<S, B, D> {
    source: S,
    backend: B,
    display: D,
    style: OverlayStyle,
    quit_key: char,
    max_frames: Option<u64>,
    fps: FpsMeter,
    frames: u64,
    instances: u64,
}

impl<S, B, D> Inspector<S, B, D>
where
    S: FrameSource,
    B: SegmenterBackend,
    D: DisplaySink,
{
    /// The source must already be connected.
    pub fn new(source: S, backend: B, display: D, quit_key: char) -> Self {
        Self {
            source,
            backend,
            display,
            style: OverlayStyle::default(),
            quit_key,
            max_frames: None,
            fps: FpsMeter::new(),
            frames: 0,
            instances: 0,
        }
    }

    /// Stop after `frames` frames. `None` runs until the camera ends or the
    /// quit key is pressed.
    pub fn with_max_frames(mut self, frames: Option<u64>) -> Self {
        self.max_frames = frames;
        self
    }

    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn into_parts(self) -> (S, B, D) {
        (self.source, self.backend, self.display)
    }

    /// Process one frame.
    pub fn step(&mut self) -> Result<StepOutcome> {
        if self.frame_limit_reached() {
            return Ok(StepOutcome::Stop(StopReason::FrameLimit));
        }
        let frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("Inspector: camera stopped delivering frames: {err:#}");
                return Ok(StepOutcome::Stop(StopReason::SourceEnded));
            }
        };
        let sequence = frame.sequence();

        self.fps.start();
        let segmentation = self
            .backend
            .segment(&frame)
            .with_context(|| format!("inference failed on frame {}", sequence))?;

        let mut image = frame.into_image();
        let backend = &self.backend;
        let drawn = annotate(&mut image, &segmentation, &self.style, |id| {
            backend.class_name(id)
        });
        let fps = self.fps.stop();
        draw_fps(&mut image, fps, &self.style);

        self.display
            .show(&image)
            .with_context(|| format!("failed to display frame {}", sequence))?;
        let key = self.display.poll_key()?;

        self.frames += 1;
        self.instances += drawn.instances as u64;
        log::debug!(
            "Inspector: frame {} instances={} contours={} fps={:.1}",
            sequence,
            drawn.instances,
            drawn.contours,
            fps
        );

        if key == Some(self.quit_key) {
            log::info!("Inspector: quit key pressed");
            return Ok(StepOutcome::Stop(StopReason::QuitKey));
        }
        if self.frame_limit_reached() {
            return Ok(StepOutcome::Stop(StopReason::FrameLimit));
        }
        Ok(StepOutcome::Continue)
    }

    fn frame_limit_reached(&self) -> bool {
        self.max_frames.is_some_and(|max| self.frames >= max)
    }

    /// Run until a stop condition, then close the display.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.log_banner();
        let result = self.run_loop();
        let closed = self.display.close();
        let stop_reason = result?;
        closed?;

        let summary = RunSummary {
            frames: self.frames,
            instances: self.instances,
            stop_reason,
            mean_fps: self.fps.mean(),
        };
        log::info!(
            "Inspector: stopped ({:?}) after {} frames, {} instances, {:.1} fps average",
            summary.stop_reason,
            summary.frames,
            summary.instances,
            summary.mean_fps
        );
        Ok(summary)
    }

    fn run_loop(&mut self) -> Result<StopReason> {
        loop {
            if let StepOutcome::Stop(reason) = self.step()? {
                return Ok(reason);
            }
        }
    }

    fn log_banner(&self) {
        log::info!(
            "Inspector: debug mode running (backend={}, display={}, tracking off)",
            self.backend.name(),
            self.display.name()
        );
        log::info!("Inspector: classes {:?}", self.backend.class_names());
        log::info!("Inspector: press '{}' to quit", self.quit_key);
    }
}
