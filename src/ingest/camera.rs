//! Camera frame source.
//!
//! `CameraSource` captures frames from a local V4L2 device node
//! (e.g. /dev/video0) or, for `stub://` paths, from a synthetic scene.
//!
//! Synthetic scenes show a bright rectangular part sliding across a dark
//! background, which gives the stub segmenter something to find. Appending
//! `?frames=N` to a stub path makes the camera fail after N frames, the same
//! way an unplugged device would.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use super::{FrameSource, SourceStats};
use crate::config::CameraSettings;
use crate::frame::Frame;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or "stub://name[?frames=N]".
    pub device: String,
    /// Requested frame width.
    pub width: u32,
    /// Requested frame height.
    pub height: u32,
    /// Requested frame rate. Zero leaves the device default.
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 1280,
            height: 720,
            target_fps: 30,
        }
    }
}

impl From<&CameraSettings> for CameraConfig {
    fn from(settings: &CameraSettings) -> Self {
        Self {
            device: settings.device.clone(),
            width: settings.width,
            height: settings.height,
            target_fps: settings.target_fps,
        }
    }
}

/// Camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(device::DeviceCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!(
                "camera resolution must be non-zero, got {}x{}",
                config.width,
                config.height
            ));
        }
        if config.device.starts_with("stub://") {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(config)?),
            });
        }
        #[cfg(feature = "ingest-v4l2")]
        {
            Ok(Self {
                backend: CameraBackend::Device(device::DeviceCamera::new(config)),
            })
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Err(anyhow!(
                "camera {} requires the ingest-v4l2 feature (use stub:// for a synthetic camera)",
                config.device
            ))
        }
    }
}

impl FrameSource for CameraSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.is_healthy(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://)
// ----------------------------------------------------------------------------

const SCENE_BACKGROUND: Rgb<u8> = Rgb([24, 24, 24]);
const SCENE_PART: Rgb<u8> = Rgb([220, 220, 220]);
/// Horizontal travel of the synthetic part per frame, in pixels.
const SCENE_STEP: u32 = 4;

struct SyntheticCamera {
    config: CameraConfig,
    frame_limit: Option<u64>,
    frame_count: u64,
    connected: bool,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Result<Self> {
        let frame_limit = parse_frame_limit(&config.device)?;
        Ok(Self {
            config,
            frame_limit,
            frame_count: 0,
            connected: false,
        })
    }

    /// Synthetic cameras are always available.
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "CameraSource: connected to {} (synthetic, {}x{})",
            self.config.device,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("camera {} not connected", self.config.device));
        }
        if let Some(limit) = self.frame_limit {
            if self.frame_count >= limit {
                return Err(anyhow!(
                    "camera {} produced no frame (stream ended after {} frames)",
                    self.config.device,
                    limit
                ));
            }
        }
        self.frame_count += 1;
        Ok(Frame::new(self.render_scene(), self.frame_count))
    }

    fn render_scene(&self) -> RgbImage {
        let (width, height) = (self.config.width, self.config.height);
        let part_w = (width / 4).max(1);
        let part_h = (height / 4).max(1);
        let travel = width.saturating_sub(part_w).max(1);
        let x0 = ((self.frame_count.saturating_sub(1) * SCENE_STEP as u64) % travel as u64) as u32;
        let y0 = (height - part_h) / 2;

        let mut image = RgbImage::from_pixel(width, height, SCENE_BACKGROUND);
        for y in y0..y0 + part_h {
            for x in x0..(x0 + part_w).min(width) {
                image.put_pixel(x, y, SCENE_PART);
            }
        }
        image
    }

    fn is_healthy(&self) -> bool {
        self.frame_limit
            .map_or(true, |limit| self.frame_count < limit)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}

fn parse_frame_limit(device: &str) -> Result<Option<u64>> {
    let Some((_, query)) = device.split_once('?') else {
        return Ok(None);
    };
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("frames=") {
            let limit = value
                .parse()
                .map_err(|_| anyhow!("invalid frame limit '{}' in {}", value, device))?;
            return Ok(Some(limit));
        }
    }
    Ok(None)
}

// ----------------------------------------------------------------------------
// V4L2 device camera
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
mod device {
    use anyhow::{anyhow, Context, Result};
    use ouroboros::self_referencing;
    use std::time::{Duration, Instant};

    use crate::frame::Frame;
    use crate::ingest::normalize::{normalize_to_rgb, PixelFormat};
    use crate::ingest::SourceStats;

    use super::CameraConfig;

    pub(super) struct DeviceCamera {
        config: CameraConfig,
        state: Option<DeviceState>,
        frame_count: u64,
        last_frame_at: Option<Instant>,
        last_error: Option<String>,
        active_width: u32,
        active_height: u32,
        active_format: PixelFormat,
    }

    #[self_referencing]
    struct DeviceState {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    impl DeviceCamera {
        pub(super) fn new(config: CameraConfig) -> Self {
            Self {
                active_width: config.width,
                active_height: config.height,
                active_format: PixelFormat::Rgb24,
                config,
                state: None,
                frame_count: 0,
                last_frame_at: None,
                last_error: None,
            }
        }

        pub(super) fn connect(&mut self) -> Result<()> {
            use v4l::buffer::Type;
            use v4l::video::Capture;

            let mut device = v4l::Device::with_path(&self.config.device)
                .with_context(|| format!("open v4l2 device {}", self.config.device))?;
            let mut format = device.format().context("read v4l2 format")?;
            format.width = self.config.width;
            format.height = self.config.height;
            format.fourcc = v4l::FourCC::new(b"RGB3");

            let format = match device.set_format(&format) {
                Ok(format) => format,
                Err(err) => {
                    log::warn!(
                        "CameraSource: failed to set format on {}: {}",
                        self.config.device,
                        err
                    );
                    device
                        .format()
                        .context("read v4l2 format after set failure")?
                }
            };

            let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
                anyhow!(
                    "v4l2 device {} delivers unsupported pixel format {}",
                    self.config.device,
                    format.fourcc
                )
            })?;

            if self.config.target_fps > 0 {
                let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
                if let Err(err) = device.set_params(&params) {
                    log::warn!(
                        "CameraSource: failed to set fps on {}: {}",
                        self.config.device,
                        err
                    );
                }
            }

            if format.width != self.config.width || format.height != self.config.height {
                log::warn!(
                    "CameraSource: {} negotiated {}x{} instead of {}x{}",
                    self.config.device,
                    format.width,
                    format.height,
                    self.config.width,
                    self.config.height
                );
            }

            self.active_width = format.width;
            self.active_height = format.height;
            self.active_format = pixel_format;
            self.last_error = None;

            let state = DeviceStateBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                        .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
                },
            }
            .try_build()
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                err
            })?;
            self.state = Some(state);

            log::info!(
                "CameraSource: connected to {} ({}x{} {:?})",
                self.config.device,
                self.active_width,
                self.active_height,
                self.active_format
            );
            Ok(())
        }

        pub(super) fn next_frame(&mut self) -> Result<Frame> {
            use v4l::io::traits::CaptureStream;

            let state = self.state.as_mut().context("v4l2 device not connected")?;
            let (buf, meta) = state
                .with_mut(|fields| fields.stream.next())
                .map_err(|err| {
                    self.last_error = Some(err.to_string());
                    anyhow::Error::new(err).context("capture v4l2 frame")
                })?;

            let used = (meta.bytesused as usize).min(buf.len());
            let payload = if used == 0 { buf } else { &buf[..used] };
            let rgb = normalize_to_rgb(
                payload,
                self.active_width,
                self.active_height,
                self.active_format,
            )?;

            self.frame_count += 1;
            self.last_frame_at = Some(Instant::now());

            Frame::from_rgb_bytes(rgb, self.active_width, self.active_height, self.frame_count)
        }

        pub(super) fn is_healthy(&self) -> bool {
            if self.last_error.is_some() {
                return false;
            }
            let Some(last_frame_at) = self.last_frame_at else {
                return true;
            };
            last_frame_at.elapsed() <= self.health_grace()
        }

        pub(super) fn stats(&self) -> SourceStats {
            SourceStats {
                frames_captured: self.frame_count,
                device: self.config.device.clone(),
            }
        }

        fn health_grace(&self) -> Duration {
            let base_ms = if self.config.target_fps == 0 {
                2_000
            } else {
                (1000 / self.config.target_fps).saturating_mul(6)
            };
            Duration::from_millis(base_ms.max(2_000) as u64)
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(device: &str) -> CameraConfig {
        CameraConfig {
            device: device.to_string(),
            target_fps: 30,
            width: 64,
            height: 48,
        }
    }

    #[test]
    fn synthetic_camera_produces_frames() -> Result<()> {
        let mut source = CameraSource::new(stub_config("stub://bench"))?;
        source.connect()?;

        let frame = source.next_frame()?;
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.sequence(), 1);
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn synthetic_part_moves_between_frames() -> Result<()> {
        let mut source = CameraSource::new(stub_config("stub://bench"))?;
        source.connect()?;

        let first = source.next_frame()?;
        let second = source.next_frame()?;
        // Part spans x in [0, 16) on frame 1 and [4, 20) on frame 2.
        assert_eq!(*first.image().get_pixel(0, 24), SCENE_PART);
        assert_eq!(*second.image().get_pixel(0, 24), SCENE_BACKGROUND);
        assert_eq!(*second.image().get_pixel(19, 24), SCENE_PART);
        Ok(())
    }

    #[test]
    fn synthetic_camera_fails_after_frame_limit() -> Result<()> {
        let mut source = CameraSource::new(stub_config("stub://bench?frames=2"))?;
        source.connect()?;

        source.next_frame()?;
        source.next_frame()?;
        assert!(!source.is_healthy());
        assert!(source.next_frame().is_err());
        Ok(())
    }

    #[test]
    fn frames_require_connect() -> Result<()> {
        let mut source = CameraSource::new(stub_config("stub://bench"))?;
        assert!(source.next_frame().is_err());
        Ok(())
    }

    #[test]
    fn invalid_frame_limit_is_rejected() {
        assert!(CameraSource::new(stub_config("stub://bench?frames=many")).is_err());
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn real_devices_need_feature() {
        assert!(CameraSource::new(stub_config("/dev/video0")).is_err());
    }
}
