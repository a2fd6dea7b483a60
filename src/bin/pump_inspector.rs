//! pump_inspector - live part segmentation debug viewer
//!
//! This binary:
//! 1. Loads configuration (TOML file, INSPECTOR_* env, then flags)
//! 2. Loads the segmentation model from beside the executable
//! 3. Opens the camera
//! 4. Runs the capture / segment / annotate / show loop until the camera
//!    ends or the quit key is pressed
//!
//! A model that fails to load is reported and the process exits with status 1
//! (after waiting for Enter when run from a terminal).

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use pump_inspector::{
    config::{executable_dir, resolve_model_path, BackendKind, DisplayKind},
    display::{open_display, HeadlessDisplay},
    ingest::{CameraConfig, CameraSource, FrameSource},
    segment::{open_backend, SegmenterBackend},
    Inspector, InspectorConfig,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "pump_inspector",
    version,
    about = "Live camera part segmentation debug viewer"
)]
struct Args {
    /// Path to a TOML config file
    #[arg(long, env = "INSPECTOR_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Model file (relative paths resolve beside the executable)
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Camera device path, or stub://name[?frames=N] for a synthetic camera
    #[arg(long, value_name = "DEVICE")]
    device: Option<String>,

    /// Requested capture width
    #[arg(long)]
    width: Option<u32>,

    /// Requested capture height
    #[arg(long)]
    height: Option<u32>,

    /// Confidence threshold in [0, 1]
    #[arg(long)]
    conf: Option<f32>,

    /// Model input size (multiple of 32)
    #[arg(long)]
    imgsz: Option<u32>,

    /// Segmentation backend (tract|stub)
    #[arg(long, value_name = "BACKEND")]
    backend: Option<String>,

    /// Display backend (window|headless)
    #[arg(long, value_name = "MODE")]
    display: Option<String>,

    /// Headless only: write the last annotated frame to this PNG on exit
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = {
        let stage = ui.stage("Load config");
        let cfg = load_config(&args)?;
        stage.done();
        cfg
    };

    let model_path = resolve_model_path(&cfg.model.path, executable_dir().as_deref());
    let backend = {
        let stage = ui.stage("Load model");
        match load_model(&cfg, &model_path) {
            Ok(backend) => {
                stage.done();
                backend
            }
            Err(err) => {
                drop(stage);
                exit_on_model_error(&model_path, &err)
            }
        }
    };
    log::info!("model classes: {:?}", backend.class_names());

    let camera = {
        let stage = ui.stage("Open camera");
        let mut camera = CameraSource::new(CameraConfig::from(&cfg.camera))?;
        camera
            .connect()
            .with_context(|| format!("failed to open camera {}", cfg.camera.device))?;
        stage.done();
        camera
    };

    let mut headless = HeadlessDisplay::new(cfg.display.quit_key);
    if let Some(path) = &cfg.display.snapshot_path {
        headless = headless.with_snapshot(path.clone());
    }
    if cfg.display.backend == DisplayKind::Headless {
        // Without a keyboard, Ctrl-C plays the role of the quit key.
        let stop = headless.stop_handle();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .context("failed to install Ctrl-C handler")?;
    }
    let display = open_display(&cfg.display, headless)?;

    let mut inspector = Inspector::new(camera, backend, display, cfg.display.quit_key)
        .with_max_frames(args.max_frames);
    let summary = inspector.run()?;

    println!(
        "pump_inspector: {} frames, {} instances, {:.1} fps average ({:?})",
        summary.frames, summary.instances, summary.mean_fps, summary.stop_reason
    );
    Ok(())
}

fn load_config(args: &Args) -> Result<InspectorConfig> {
    let mut cfg = InspectorConfig::load_from(args.config.as_deref())?;
    if let Some(model) = &args.model {
        cfg.model.path = model.clone();
    }
    if let Some(device) = &args.device {
        cfg.camera.device = device.clone();
    }
    if let Some(width) = args.width {
        cfg.camera.width = width;
    }
    if let Some(height) = args.height {
        cfg.camera.height = height;
    }
    if let Some(conf) = args.conf {
        cfg.model.conf_threshold = conf;
    }
    if let Some(imgsz) = args.imgsz {
        cfg.model.imgsz = imgsz;
    }
    if let Some(backend) = &args.backend {
        cfg.model.backend = BackendKind::parse(backend)?;
    }
    if let Some(display) = &args.display {
        cfg.display.backend = DisplayKind::parse(display)?;
    }
    if let Some(snapshot) = &args.snapshot {
        cfg.display.snapshot_path = Some(snapshot.clone());
    }
    cfg.validate()?;
    Ok(cfg)
}

fn load_model(cfg: &InspectorConfig, model_path: &Path) -> Result<Box<dyn SegmenterBackend>> {
    let mut backend = open_backend(&cfg.model, model_path)?;
    backend.warm_up().context("model warm-up failed")?;
    log::info!(
        "loaded {} backend from {}",
        backend.name(),
        model_path.display()
    );
    Ok(backend)
}

fn exit_on_model_error(model_path: &Path, err: &anyhow::Error) -> ! {
    log::error!(
        "CRITICAL ERROR: could not load model {}: {err:#}",
        model_path.display()
    );
    if std::io::stdin().is_terminal() {
        eprintln!("Press Enter to exit...");
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
    }
    std::process::exit(1);
}
