use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_MODEL_PATH: &str = "best.onnx";
const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_IMGSZ: u32 = 640;
const DEFAULT_CONF_THRESHOLD: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.7;
const DEFAULT_MAX_DETECTIONS: usize = 300;
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
const DEFAULT_CAMERA_WIDTH: u32 = 1280;
const DEFAULT_CAMERA_HEIGHT: u32 = 720;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_WINDOW_TITLE: &str = "Pump Inspector DEBUG";
const DEFAULT_QUIT_KEY: char = 'q';

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct InspectorConfigFile {
    model: Option<ModelConfigFile>,
    camera: Option<CameraConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    backend: Option<String>,
    imgsz: Option<u32>,
    conf_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
    class_names: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DisplayConfigFile {
    backend: Option<String>,
    window_title: Option<String>,
    quit_key: Option<String>,
    snapshot_path: Option<PathBuf>,
}

/// Which segmentation backend runs inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Tract,
    Stub,
}

impl BackendKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tract" | "onnx" => Ok(Self::Tract),
            "stub" => Ok(Self::Stub),
            other => Err(anyhow!("unknown model backend '{}' (expected tract|stub)", other)),
        }
    }
}

/// Where annotated frames are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKind {
    Window,
    Headless,
}

impl DisplayKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "window" => Ok(Self::Window),
            "headless" => Ok(Self::Headless),
            other => Err(anyhow!(
                "unknown display backend '{}' (expected window|headless)",
                other
            )),
        }
    }

    /// The window backend when compiled in, headless otherwise.
    pub fn platform_default() -> Self {
        if cfg!(feature = "display-opencv") {
            Self::Window
        } else {
            Self::Headless
        }
    }
}

#[derive(Debug, Clone)]
pub struct InspectorConfig {
    pub model: ModelSettings,
    pub camera: CameraSettings,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Model file. Relative paths are resolved beside the executable.
    pub path: PathBuf,
    pub backend: BackendKind,
    pub imgsz: u32,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Overrides the class names embedded in the model.
    pub class_names: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub backend: DisplayKind,
    pub window_title: String,
    pub quit_key: char,
    pub snapshot_path: Option<PathBuf>,
}

impl InspectorConfig {
    /// Load using `INSPECTOR_CONFIG` for the file path, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("INSPECTOR_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit config file (if any), then env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => InspectorConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: InspectorConfigFile) -> Result<Self> {
        let model = file.model.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let display = file.display.unwrap_or_default();

        let model = ModelSettings {
            path: model
                .path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            backend: BackendKind::parse(model.backend.as_deref().unwrap_or(DEFAULT_BACKEND))?,
            imgsz: model.imgsz.unwrap_or(DEFAULT_IMGSZ),
            conf_threshold: model.conf_threshold.unwrap_or(DEFAULT_CONF_THRESHOLD),
            iou_threshold: model.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            max_detections: model.max_detections.unwrap_or(DEFAULT_MAX_DETECTIONS),
            class_names: model.class_names,
        };
        let camera = CameraSettings {
            device: camera
                .device
                .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
            width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
        };
        let display = DisplaySettings {
            backend: match display.backend.as_deref() {
                Some(value) => DisplayKind::parse(value)?,
                None => DisplayKind::platform_default(),
            },
            window_title: display
                .window_title
                .unwrap_or_else(|| DEFAULT_WINDOW_TITLE.to_string()),
            quit_key: match display.quit_key.as_deref() {
                Some(value) => parse_quit_key(value)?,
                None => DEFAULT_QUIT_KEY,
            },
            snapshot_path: display.snapshot_path,
        };

        Ok(Self {
            model,
            camera,
            display,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("INSPECTOR_MODEL") {
            if !path.trim().is_empty() {
                self.model.path = PathBuf::from(path);
            }
        }
        if let Ok(backend) = std::env::var("INSPECTOR_BACKEND") {
            if !backend.trim().is_empty() {
                self.model.backend = BackendKind::parse(&backend)?;
            }
        }
        if let Ok(device) = std::env::var("INSPECTOR_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(conf) = std::env::var("INSPECTOR_CONF") {
            self.model.conf_threshold = conf
                .trim()
                .parse()
                .map_err(|_| anyhow!("INSPECTOR_CONF must be a number between 0 and 1"))?;
        }
        if let Ok(imgsz) = std::env::var("INSPECTOR_IMGSZ") {
            self.model.imgsz = imgsz
                .trim()
                .parse()
                .map_err(|_| anyhow!("INSPECTOR_IMGSZ must be an integer"))?;
        }
        Ok(())
    }

    /// Check every setting. Called after all overrides are applied.
    pub fn validate(&self) -> Result<()> {
        check_unit_interval("model.conf_threshold", self.model.conf_threshold)?;
        check_unit_interval("model.iou_threshold", self.model.iou_threshold)?;
        if self.model.imgsz == 0 || self.model.imgsz % 32 != 0 {
            return Err(anyhow!(
                "model.imgsz must be a non-zero multiple of 32, got {}",
                self.model.imgsz
            ));
        }
        if self.model.max_detections == 0 {
            return Err(anyhow!("model.max_detections must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "camera resolution must be non-zero, got {}x{}",
                self.camera.width,
                self.camera.height
            ));
        }
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera.device must not be empty"));
        }
        Ok(())
    }
}

/// Resolve a model path: absolute paths are kept, relative ones are joined
/// onto `base_dir` (normally the directory holding the executable).
pub fn resolve_model_path(path: &Path, base_dir: Option<&Path>) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match base_dir {
        Some(base) => base.join(path),
        None => path.to_path_buf(),
    }
}

/// Directory of the running executable, if it can be determined.
pub fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

fn parse_quit_key(value: &str) -> Result<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(key), None) if key.is_ascii() && !key.is_ascii_control() => Ok(key),
        _ => Err(anyhow!(
            "display.quit_key must be a single printable ASCII character, got '{}'",
            value
        )),
    }
}

fn check_unit_interval(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<InspectorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_key_must_be_single_ascii() {
        assert_eq!(parse_quit_key("q").unwrap(), 'q');
        assert!(parse_quit_key("").is_err());
        assert!(parse_quit_key("qq").is_err());
        assert!(parse_quit_key("é").is_err());
    }

    #[test]
    fn relative_model_paths_resolve_beside_base() {
        let base = Path::new("/opt/inspector");
        assert_eq!(
            resolve_model_path(Path::new("best.onnx"), Some(base)),
            PathBuf::from("/opt/inspector/best.onnx")
        );
        assert_eq!(
            resolve_model_path(Path::new("/models/pump.onnx"), Some(base)),
            PathBuf::from("/models/pump.onnx")
        );
        assert_eq!(
            resolve_model_path(Path::new("best.onnx"), None),
            PathBuf::from("best.onnx")
        );
    }

    #[test]
    fn file_defaults_match_inspection_setup() {
        let cfg = InspectorConfig::from_file(InspectorConfigFile::default()).unwrap();
        assert_eq!(cfg.camera.width, 1280);
        assert_eq!(cfg.camera.height, 720);
        assert_eq!(cfg.model.imgsz, 640);
        assert_eq!(cfg.model.conf_threshold, 0.25);
        assert_eq!(cfg.model.backend, BackendKind::Tract);
        assert_eq!(cfg.display.window_title, "Pump Inspector DEBUG");
        assert_eq!(cfg.display.quit_key, 'q');
        cfg.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_imgsz_and_thresholds() {
        let mut cfg = InspectorConfig::from_file(InspectorConfigFile::default()).unwrap();
        cfg.model.imgsz = 650;
        assert!(cfg.validate().is_err());

        cfg.model.imgsz = 640;
        cfg.model.conf_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!(BackendKind::parse("Tract").unwrap(), BackendKind::Tract);
        assert_eq!(BackendKind::parse("stub").unwrap(), BackendKind::Stub);
        assert!(BackendKind::parse("torch").is_err());
        assert_eq!(DisplayKind::parse("headless").unwrap(), DisplayKind::Headless);
        assert!(DisplayKind::parse("tv").is_err());
    }
}
