#![cfg(feature = "display-opencv")]

use anyhow::{Context, Result};
use image::RgbImage;
use opencv::core::{Mat, Mat_AUTO_STEP, CV_8UC3};
use opencv::highgui;

use super::DisplaySink;

/// Delay handed to `wait_key`, in milliseconds. Also paces the window's
/// event loop.
const KEY_WAIT_MS: i32 = 1;

/// Native debug window backed by OpenCV highgui.
pub struct WindowDisplay {
    title: String,
    bgr: Vec<u8>,
    open: bool,
}

impl WindowDisplay {
    pub fn open(title: &str) -> Result<Self> {
        highgui::named_window(title, highgui::WINDOW_AUTOSIZE)
            .with_context(|| format!("failed to open window '{}'", title))?;
        log::info!("WindowDisplay: opened '{}'", title);
        Ok(Self {
            title: title.to_string(),
            bgr: Vec::new(),
            open: true,
        })
    }
}

impl DisplaySink for WindowDisplay {
    fn name(&self) -> &'static str {
        "window"
    }

    fn show(&mut self, image: &RgbImage) -> Result<()> {
        self.bgr.clear();
        self.bgr.reserve(image.as_raw().len());
        for px in image.as_raw().chunks_exact(3) {
            self.bgr.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        // SAFETY: `self.bgr` holds rows*cols*3 bytes and outlives `mat`,
        // which is dropped before the buffer is touched again.
        let mat = unsafe {
            Mat::new_rows_cols_with_data_unsafe(
                image.height() as i32,
                image.width() as i32,
                CV_8UC3,
                self.bgr.as_mut_ptr().cast(),
                Mat_AUTO_STEP,
            )
        }
        .context("failed to wrap frame for display")?;
        highgui::imshow(&self.title, &mat).context("imshow failed")?;
        Ok(())
    }

    fn poll_key(&mut self) -> Result<Option<char>> {
        let key = highgui::wait_key(KEY_WAIT_MS).context("wait_key failed")?;
        if key < 0 {
            return Ok(None);
        }
        Ok(char::from_u32((key & 0xff) as u32))
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            highgui::destroy_all_windows().context("failed to close windows")?;
            log::info!("WindowDisplay: closed '{}'", self.title);
        }
        Ok(())
    }
}

impl Drop for WindowDisplay {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("WindowDisplay: {err:#}");
        }
    }
}
