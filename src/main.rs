//! Face pose tracker over a sequence of image frames.

use anyhow::{Context, Result};
use clap::Parser;
use face_pose_tracker::{
    config::{Config, EXAMPLE_CONFIG},
    frame_source::ImageSequence,
    tracker::FaceTracker,
    types::FaceResult,
};
use log::info;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Frame width (default: size of the first readable frame)
    #[arg(long)]
    width: Option<u32>,

    /// Frame height (default: size of the first readable frame)
    #[arg(long)]
    height: Option<u32>,

    /// Maximum number of faces to track
    #[arg(short, long)]
    max_faces: Option<usize>,

    /// Run detection on every Nth frame
    #[arg(short, long)]
    every: Option<u32>,

    /// Detect on frames shrunk by this factor
    #[arg(long)]
    downscale: Option<u32>,

    /// Print each frame's result as YAML
    #[arg(long)]
    yaml: bool,

    /// Print an example configuration file and exit
    #[arg(long)]
    example_config: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Image files to process as consecutive frames
    frames: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    if args.example_config {
        print!("{EXAMPLE_CONFIG}");
        return Ok(());
    }

    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        match Config::from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("Failed to load config file: {e}. Using defaults.");
                Config::default()
            }
        }
    } else {
        Config::default()
    };
    apply_overrides(&mut config, &args);

    let mut tracker = FaceTracker::from_config(&config).context("Invalid tracker configuration")?;

    for (index, frame) in ImageSequence::new(args.frames).enumerate() {
        let result = tracker.process(frame.as_ref());
        if args.yaml {
            print_yaml(index, result)?;
        } else {
            print_summary(index, result);
        }
    }

    info!("Processed {} frame(s)", tracker.frame_count());
    Ok(())
}

/// Command line values win over the configuration file; frame size falls back
/// to the first readable frame.
fn apply_overrides(config: &mut Config, args: &Args) {
    let probed = if args.width.is_none() || args.height.is_none() {
        ImageSequence::probe_dimensions(&args.frames)
    } else {
        None
    };

    if let Some(width) = args.width.or(probed.map(|(w, _)| w)) {
        config.tracker.image_width = width;
    }
    if let Some(height) = args.height.or(probed.map(|(_, h)| h)) {
        config.tracker.image_height = height;
    }
    if let Some(max_faces) = args.max_faces {
        config.tracker.max_faces = max_faces;
    }
    if let Some(every) = args.every {
        config.tracker.detect_every_n_frames = every;
    }
    if let Some(downscale) = args.downscale {
        config.tracker.downscale = downscale;
    }
}

fn print_summary(index: usize, result: &FaceResult) {
    if result.is_empty() {
        println!("frame {index}: no faces");
        return;
    }

    for (face_index, face) in result.iter().enumerate() {
        let [pitch, yaw, roll] = face.pose.euler_degrees();
        let [tx, ty, tz] = face.pose.translation;
        println!(
            "frame {index} face {face_index}: box ({}, {}, {}x{}) pitch {pitch:.1} yaw {yaw:.1} roll {roll:.1} translation ({tx:.1}, {ty:.1}, {tz:.1})",
            face.bbox.x, face.bbox.y, face.bbox.width, face.bbox.height
        );
    }
}

fn print_yaml(index: usize, result: &FaceResult) -> Result<()> {
    let yaml = serde_yaml::to_string(result).context("Failed to serialize result")?;
    println!("# frame {index}\n---\n{yaml}");
    Ok(())
}
