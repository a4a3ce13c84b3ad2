//! Offline AR viewer
//!
//! Replays a directory of camera frames with recorded marker detections
//! through the AR pipeline. Keys can be preloaded with `--keys` or typed on
//! stdin with `--interactive` (one line at a time, ESC or `x` to quit).

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{bail, Context, Result};
use clap::Parser;

use ar_engine::assets::{ModelCatalog, MtlLoader, ObjLoader};
use ar_engine::config::Config;
use ar_engine::core::config::ApplicationConfig;
use ar_engine::foundation::logging;
use ar_engine::input::{Command, CommandSender, Key, KeyBindings};
use ar_engine::render::RecordingBackend;
use ar_engine::vision::{CameraIntrinsics, ImageSequenceSource, ReplayDetector};
use ar_engine::{ArPipeline, Collaborators};

#[derive(Parser, Debug)]
#[command(name = "ar_viewer", version, about = "Draw a 3D model on a fiducial marker")]
struct Args {
    /// Configuration file (TOML or RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model identifier from the catalogue
    #[arg(short, long)]
    model: Option<String>,

    /// Directory of camera frames, replayed in name order
    #[arg(short, long)]
    frames: Option<PathBuf>,

    /// RON detection log; defaults to `detections.ron` inside the frames directory
    #[arg(short, long)]
    detections: Option<PathBuf>,

    /// Camera calibration file, overrides the configured one
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Directory relative model paths are resolved against
    #[arg(long)]
    models_root: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Keys applied before the first frame, e.g. `++l`
    #[arg(long)]
    keys: Option<String>,

    /// Read keys from stdin while running
    #[arg(long)]
    interactive: bool,

    /// Print the model catalogue and exit
    #[arg(long)]
    list_models: bool,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<ApplicationConfig> {
    let mut config = match &args.config {
        Some(path) => ApplicationConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ApplicationConfig::default(),
    };
    if let Some(path) = &args.calibration {
        config.camera.calibration_path = Some(path.clone());
    }

    let root = args
        .models_root
        .clone()
        .or_else(|| args.config.as_deref().and_then(Path::parent).map(Path::to_path_buf));
    if let Some(root) = root {
        config.models = config.models.rebased(root);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_catalog(models: &ModelCatalog) {
    println!("Available models:");
    for (i, entry) in models.listing().iter().enumerate() {
        let mark = if entry.exists { '✓' } else { '✗' };
        println!(
            "  {:>2}. {} {:<24} scale {:<6} {}",
            i + 1,
            mark,
            entry.identifier,
            entry.scale,
            entry.path.display()
        );
    }
}

/// Send each mapped key; returns false once the pipeline stops listening
fn send_keys(keys: &str, bindings: &KeyBindings, sender: &CommandSender) -> bool {
    for byte in keys.bytes() {
        let key = match byte {
            b'x' | b'X' => Key::Escape,
            other => Key::from_byte(other),
        };
        if let Some(command) = bindings.map(key) {
            if !sender.send(command) {
                return false;
            }
        }
    }
    true
}

fn spawn_stdin_reader(bindings: KeyBindings, sender: CommandSender) {
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if let Some(id) = line.strip_prefix(':') {
                if !sender.send(Command::SwitchModel(id.trim().to_string())) {
                    break;
                }
            } else if !send_keys(line, &bindings, &sender) {
                break;
            }
        }
        log::debug!("Stdin reader finished");
    });
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    logging::init(&config.engine.log_level);

    if let Some(path) = &args.write_config {
        config
            .save_to_file(path)
            .with_context(|| format!("Failed to write configuration to {}", path.display()))?;
        log::info!("Configuration written to {}", path.display());
        return Ok(());
    }

    if args.list_models {
        print_catalog(&config.models);
        return Ok(());
    }

    let Some(model) = args.model.as_deref() else {
        print_catalog(&config.models);
        bail!("No model selected; pass --model <id>");
    };
    let Some(frames) = args.frames.as_deref() else {
        bail!("No frame directory given; pass --frames <dir>");
    };
    let detections = args
        .detections
        .clone()
        .unwrap_or_else(|| frames.join("detections.ron"));

    let intrinsics =
        CameraIntrinsics::from_config(&config).context("Failed to resolve camera intrinsics")?;
    let collaborators = Collaborators {
        frame_source: Box::new(
            ImageSequenceSource::open(frames)
                .with_context(|| format!("Failed to open frames in {}", frames.display()))?,
        ),
        detector: Box::new(
            ReplayDetector::from_file(&detections)
                .with_context(|| format!("Failed to load detections from {}", detections.display()))?,
        ),
        geometry_loader: Box::new(ObjLoader::new()),
        material_loader: Box::new(MtlLoader::new()),
        backend: Box::new(RecordingBackend::headless()),
    };

    let mut pipeline = ArPipeline::new(&config, intrinsics, collaborators)?;
    let bindings = KeyBindings::from_config(&config.controls);
    let sender = pipeline.command_sender();
    if let Some(keys) = &args.keys {
        send_keys(keys, &bindings, &sender);
    }
    if args.interactive {
        spawn_stdin_reader(bindings, sender);
    }

    pipeline
        .start(model)
        .with_context(|| format!("Failed to start with model '{model}'"))?;
    let stats = pipeline.run(args.max_frames).context("Pipeline failed")?;
    pipeline.stop();

    println!("{stats}");
    Ok(())
}
