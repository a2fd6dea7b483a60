//! Presentation of annotated frames.
//!
//! This module is responsible for:
//! - showing each annotated frame (window or headless sink)
//! - polling the keyboard once per frame
//! - releasing display resources on shutdown
//!
//! It MUST NOT modify frames; it receives them fully annotated.

mod headless;
#[cfg(feature = "display-opencv")]
mod window;

use anyhow::Result;
use image::RgbImage;

use crate::config::{DisplayKind, DisplaySettings};

pub use headless::HeadlessDisplay;
#[cfg(feature = "display-opencv")]
pub use window::WindowDisplay;

/// Sink for annotated frames plus the keyboard attached to it.
pub trait DisplaySink {
    fn name(&self) -> &'static str;

    /// Present one frame.
    fn show(&mut self, image: &RgbImage) -> Result<()>;

    /// Wait at most one display tick for a key press.
    fn poll_key(&mut self) -> Result<Option<char>>;

    /// Release the window (or flush the sink). Safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

impl<D: DisplaySink + ?Sized> DisplaySink for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn show(&mut self, image: &RgbImage) -> Result<()> {
        (**self).show(image)
    }

    fn poll_key(&mut self) -> Result<Option<char>> {
        (**self).poll_key()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Build the display selected in `settings`.
///
/// `headless` is used as-is when the headless backend is selected, so the
/// caller can keep its stop handle.
pub fn open_display(settings: &DisplaySettings, headless: HeadlessDisplay) -> Result<Box<dyn DisplaySink>> {
    match settings.backend {
        DisplayKind::Headless => Ok(Box::new(headless)),
        #[cfg(feature = "display-opencv")]
        DisplayKind::Window => Ok(Box::new(WindowDisplay::open(&settings.window_title)?)),
        #[cfg(not(feature = "display-opencv"))]
        DisplayKind::Window => Err(anyhow::anyhow!(
            "window display requested but the display-opencv feature is disabled"
        )),
    }
}
