mod console_ui;
mod settings;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use facescan_core::capture::domain::media_capture::MediaCapture;
use facescan_core::capture::infrastructure::image_sequence_camera::ImageSequenceCamera;
use facescan_core::capture::infrastructure::unavailable_camera::UnavailableCamera;
use facescan_core::detection::domain::face_detector::{share, SharedDetector};
use facescan_core::detection::infrastructure::scripted_face_detector::ScriptedFaceDetector;
use facescan_core::scan::orchestrator::{ScanOrchestrator, ScanOutcome, UploadOutcome};
use facescan_core::scan::scan_config::ScanConfig;

use crate::console_ui::ConsoleUi;
use crate::settings::Settings;

/// Scan a face and preview hairstyles that suit it.
#[derive(Parser)]
#[command(name = "facescan", version)]
struct Cli {
    /// Settings file to use instead of the per-user one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a face from the camera.
    Scan(ScanArgs),
    /// Analyze a photo instead of using the camera.
    Upload {
        /// Photo to analyze.
        image: PathBuf,

        /// Print the attributes as JSON on stdout.
        #[arg(long)]
        json: bool,
    },
    /// Print the effective settings.
    Config {
        /// Also save them as the per-user settings.
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Directory of still images to use as the camera. Without it no
    /// camera is available.
    #[arg(long)]
    camera: Option<PathBuf>,

    /// JSON file of recorded detections keyed by frame index.
    #[arg(long, conflicts_with = "model")]
    detections: Option<PathBuf>,

    /// Face detection model to run.
    #[arg(long, value_enum)]
    model: Option<Model>,

    /// Download location for the model if it is not cached.
    #[arg(long)]
    model_url: Option<String>,

    /// Give up if no face is found within this many seconds.
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Milliseconds between detection polls.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Hairstyle to preview once the scan succeeds.
    #[arg(long)]
    style: Option<String>,

    /// Print the attributes as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Model {
    Blazeface,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load(),
    };

    match cli.command {
        Command::Config { write } => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            if write {
                let path = settings.save()?;
                log::info!("Settings written to {}", path.display());
            }
            Ok(())
        }
        command => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async move {
                match command {
                    Command::Scan(args) => run_scan(args, &settings).await,
                    Command::Upload { image, json } => run_upload(image, json, &settings).await,
                    Command::Config { .. } => Ok(()),
                }
            })
        }
    }
}

async fn run_scan(args: ScanArgs, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let config = scan_config(&args, settings)?;
    let camera: Arc<dyn MediaCapture> = match &args.camera {
        Some(dir) => Arc::new(ImageSequenceCamera::new(dir)),
        None => Arc::new(UnavailableCamera),
    };
    let detector = build_detector(&args, settings)?;

    let (handle, task) =
        ScanOrchestrator::new(camera, detector, Box::new(ConsoleUi::stderr()), config).spawn();

    let scan = handle.scan();
    tokio::pin!(scan);
    let outcome = tokio::select! {
        outcome = &mut scan => outcome,
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted, aborting scan");
            handle.abort();
            scan.await
        }
        _ = tokio::time::sleep(Duration::from_secs(args.timeout_secs)) => {
            log::warn!("No face found within {}s, aborting scan", args.timeout_secs);
            handle.abort();
            scan.await
        }
    };

    if let (Some(ScanOutcome::Resolved(_)), Some(style)) = (&outcome, args.style) {
        handle.select_hairstyle(style);
    }
    handle.shutdown();
    task.await?;

    match outcome {
        Some(ScanOutcome::Resolved(attributes)) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&attributes)?);
            }
            Ok(())
        }
        Some(ScanOutcome::Failed(reason)) => Err(format!("Scan failed: {reason}").into()),
        Some(ScanOutcome::Aborted) | None => Err("Scan ended without a result".into()),
    }
}

async fn run_upload(
    image: PathBuf,
    json: bool,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    if !image.exists() {
        return Err(format!("Photo not found: {}", image.display()).into());
    }
    let (handle, task) = ScanOrchestrator::new(
        Arc::new(UnavailableCamera),
        share(ScriptedFaceDetector::default()),
        Box::new(ConsoleUi::stderr()),
        settings.scan_config(),
    )
    .spawn();

    let outcome = handle.analyze_upload(image).await;
    handle.shutdown();
    task.await?;

    match outcome {
        Some(UploadOutcome::Analyzed(attributes)) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&attributes)?);
            }
            Ok(())
        }
        Some(UploadOutcome::Failed(reason)) => Err(reason.into()),
        None => Err("Upload ended without a result".into()),
    }
}

fn scan_config(
    args: &ScanArgs,
    settings: &Settings,
) -> Result<ScanConfig, Box<dyn std::error::Error>> {
    let mut config = settings.scan_config();
    if let Some(ms) = args.poll_interval_ms {
        if ms == 0 {
            return Err("Poll interval must be at least 1ms".into());
        }
        config.poll_interval = Duration::from_millis(ms);
    }
    if args.timeout_secs == 0 {
        return Err("Timeout must be at least 1 second".into());
    }
    Ok(config)
}

fn build_detector(
    args: &ScanArgs,
    settings: &Settings,
) -> Result<SharedDetector, Box<dyn std::error::Error>> {
    if let Some(path) = &args.detections {
        let detector = ScriptedFaceDetector::from_json_file(path)?;
        log::info!(
            "Replaying detections for {} frames from {}",
            detector.frames_with_faces(),
            path.display()
        );
        return Ok(share(detector));
    }
    match args.model {
        Some(Model::Blazeface) => blazeface_detector(args, settings),
        None => Err("Either --detections or --model is required".into()),
    }
}

/// Loads the model in the background so the camera can start right away;
/// polls are skipped until it is ready.
#[cfg(feature = "blazeface")]
fn blazeface_detector(
    args: &ScanArgs,
    settings: &Settings,
) -> Result<SharedDetector, Box<dyn std::error::Error>> {
    use facescan_core::detection::domain::face_detector::FaceDetector;
    use facescan_core::detection::infrastructure::background_loaded_detector::BackgroundLoadedDetector;
    use facescan_core::detection::infrastructure::model_resolver;
    use facescan_core::detection::infrastructure::onnx_blazeface_detector::OnnxBlazefaceDetector;
    use facescan_core::shared::constants::BLAZEFACE_MODEL_NAME;

    if !(0.0..=1.0).contains(&settings.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            settings.confidence
        )
        .into());
    }
    let url = args.model_url.clone().or_else(|| settings.model_url.clone());
    let confidence = settings.confidence;

    log::info!("Resolving model: {BLAZEFACE_MODEL_NAME}");
    Ok(share(BackgroundLoadedDetector::spawn(move || {
        let path = model_resolver::resolve(BLAZEFACE_MODEL_NAME, url.as_deref(), None)
            .map_err(|e| e.to_string())?;
        let detector = OnnxBlazefaceDetector::new(&path, confidence).map_err(|e| e.to_string())?;
        Ok::<Box<dyn FaceDetector>, String>(Box::new(detector))
    })))
}

#[cfg(not(feature = "blazeface"))]
fn blazeface_detector(
    _args: &ScanArgs,
    _settings: &Settings,
) -> Result<SharedDetector, Box<dyn std::error::Error>> {
    Err("facescan was built without the `blazeface` feature".into())
}
