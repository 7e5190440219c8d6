use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use maskwatch_core::classification::infrastructure::model_resolver;
use maskwatch_core::classification::infrastructure::weight_store::{WeightStore, DEFAULT_CLASS_COUNT};
use maskwatch_core::pipeline::detect_masks_use_case::DetectMasksUseCase;
use maskwatch_core::pipeline::infrastructure::context_factory::build_context;
use maskwatch_core::pipeline::pipeline_logger::StagePipelineLogger;
use maskwatch_core::pipeline::stream_masks_use_case::{StopReason, StreamMasksUseCase};
use maskwatch_core::shared::config::MaskConfig;
use maskwatch_core::shared::constants::IMAGE_EXTENSIONS;
use maskwatch_core::video::domain::image_writer::ImageWriter;
use maskwatch_core::video::infrastructure::ffmpeg_reader::FfmpegReader;
use maskwatch_core::video::infrastructure::image_file_reader::is_supported_image;
use maskwatch_core::video::infrastructure::image_file_writer::ImageFileWriter;
use maskwatch_core::video::infrastructure::jpeg_sequence_sink::JpegSequenceSink;

/// Face mask detection for images, video files and cameras.
#[derive(Parser)]
#[command(name = "maskwatch")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Classifier artifact to use instead of the resolved one.
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Directory searched for the classifier, backbone and detector models.
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// Face detector model file.
    #[arg(long, global = true)]
    detector: Option<PathBuf>,

    /// TrueType font for label text (DejaVu Sans when omitted).
    #[arg(long, global = true)]
    font: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Annotate one or more images.
    Image {
        /// Input image files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file for a single input, or output directory.
        /// Defaults to `<name>_masks.<ext>` next to each input.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the detections as JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Annotate a video file into numbered JPEG frames.
    Video {
        input: PathBuf,

        #[arg(long)]
        out_dir: PathBuf,

        /// Stop after this many frames.
        #[arg(long)]
        max_frames: Option<usize>,
    },

    /// Annotate a camera stream into numbered JPEG frames until Ctrl-C.
    Camera {
        /// Capture device index.
        #[arg(long, default_value = "0")]
        index: u32,

        #[arg(long)]
        out_dir: PathBuf,

        /// Stop after this many frames.
        #[arg(long)]
        max_frames: Option<usize>,
    },

    /// Show which classifier artifact would be used and why.
    Resolve,

    /// List the tensors of a weight store and the inferred class count.
    Inspect { weights: PathBuf },
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
    validate(&cli)?;
    let config = build_config(&cli)?;

    match cli.command {
        Command::Image {
            inputs,
            output,
            json,
        } => run_images(config, &inputs, output.as_deref(), json),
        Command::Video {
            input,
            out_dir,
            max_frames,
        } => run_stream(config, FfmpegReader::file(&input), &out_dir, max_frames),
        Command::Camera {
            index,
            out_dir,
            max_frames,
        } => run_stream(config, FfmpegReader::camera(index), &out_dir, max_frames),
        Command::Resolve => run_resolve(&config),
        Command::Inspect { weights } => run_inspect(&weights),
    }
}

fn build_config(cli: &Cli) -> Result<MaskConfig, Box<dyn std::error::Error>> {
    let mut config = MaskConfig::from_env()?;
    if let Some(model) = &cli.model {
        config.model_override = Some(model.clone());
    }
    if let Some(dir) = &cli.models_dir {
        config.models_dir = Some(dir.clone());
    }
    if let Some(detector) = &cli.detector {
        config.detector_path = Some(detector.clone());
    }
    if let Some(font) = &cli.font {
        config.label_font = Some(font.clone());
    }
    Ok(config)
}

fn run_images(
    config: MaskConfig,
    inputs: &[PathBuf],
    output: Option<&Path>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let context = Arc::new(build_context(config, &[])?);
    let use_case = DetectMasksUseCase::new(context);
    let writer = ImageFileWriter::new();

    let mut report = Vec::with_capacity(inputs.len());
    for input in inputs {
        let (frame, detections) = use_case.process_image_file(input)?;
        let target = output_path(input, output, inputs.len() > 1);
        writer.write(&target, &frame)?;
        log::info!(
            "{}: {} face(s), written to {}",
            input.display(),
            detections.len(),
            target.display()
        );
        report.push(serde_json::json!({
            "input": input.display().to_string(),
            "output": target.display().to_string(),
            "width": frame.width(),
            "height": frame.height(),
            "detections": detections,
        }));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn run_stream(
    config: MaskConfig,
    mut source: FfmpegReader,
    out_dir: &Path,
    max_frames: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let context = Arc::new(build_context(config, &[])?);
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))?;

    let use_case = StreamMasksUseCase::new(DetectMasksUseCase::new(context), Some(cancelled));
    let mut sink = JpegSequenceSink::new(out_dir)?.with_limit(max_frames);
    let mut logger = StagePipelineLogger::default();

    log::info!("Opening {}", source.target().describe());
    let summary = use_case.execute(&mut source, &mut sink, &mut logger)?;

    match &summary.stop {
        StopReason::Exhausted | StopReason::Disconnected => {}
        StopReason::Cancelled => log::info!("Stream cancelled"),
        StopReason::ReadFailed(reason) => log::warn!("Stream read failed: {reason}"),
        StopReason::FrameRejected(reason) => log::warn!("Stream ended on a bad frame: {reason}"),
    }
    log::info!(
        "{} frame(s), {} face(s) written to {}",
        summary.frames,
        summary.faces,
        out_dir.display()
    );
    Ok(())
}

fn run_resolve(config: &MaskConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Models directory: {}", config.resolved_models_dir().display());
    println!("Face detector:    {}", describe_file(&config.detector_model_path()));
    println!("Backbone:         {}", describe_file(&config.backbone_model_path()));
    match model_resolver::resolve_from_config(config, &[]) {
        Ok(resolved) => {
            println!(
                "Classifier:       {} ({})",
                resolved.path.display(),
                resolved.from
            );
            Ok(())
        }
        Err(e) => {
            println!("Classifier:       none");
            Err(e.into())
        }
    }
}

fn run_inspect(weights: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let path = WeightStore::locate_for(weights)?;
    let store = WeightStore::open(&path)?;
    println!("{} ({} tensors)", path.display(), store.len());
    for (name, tensor) in store.tensors() {
        println!("  {name:40} {:?}  [{}]", tensor.shape, tensor.raw_name);
    }
    for skipped in store.skipped() {
        println!(
            "  skipped {} ({}, {:?})",
            skipped.raw_name, skipped.dtype, skipped.shape
        );
    }
    match store.infer_class_count() {
        Some(classes) => println!("Classes: {classes}"),
        None => println!("Classes: {DEFAULT_CLASS_COUNT} (default, could not infer)"),
    }
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    match &cli.command {
        Command::Image { inputs, output, .. } => {
            for input in inputs {
                if !input.exists() {
                    return Err(format!("Input file not found: {}", input.display()).into());
                }
                if !is_supported_image(input) {
                    return Err(format!(
                        "Unsupported image type: {} (expected one of: {})",
                        input.display(),
                        IMAGE_EXTENSIONS.join(", ")
                    )
                    .into());
                }
            }
            if let Some(output) = output {
                if inputs.len() > 1 && output.is_file() {
                    return Err("--output must be a directory when several inputs are given".into());
                }
            }
        }
        Command::Video {
            input, max_frames, ..
        } => {
            if !input.exists() {
                return Err(format!("Input file not found: {}", input.display()).into());
            }
            check_max_frames(*max_frames)?;
        }
        Command::Camera { max_frames, .. } => check_max_frames(*max_frames)?,
        Command::Inspect { weights } => {
            if !weights.exists() {
                return Err(format!("Weights file not found: {}", weights.display()).into());
            }
        }
        Command::Resolve => {}
    }
    if let Some(font) = &cli.font {
        if !font.is_file() {
            return Err(format!("Font file not found: {}", font.display()).into());
        }
    }
    Ok(())
}

fn check_max_frames(max_frames: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    if max_frames == Some(0) {
        return Err("--max-frames must be at least 1".into());
    }
    Ok(())
}

/// Where the annotated copy of `input` goes.
fn output_path(input: &Path, output: Option<&Path>, many: bool) -> PathBuf {
    let annotated_name = || {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let ext = input
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "jpg".to_string());
        format!("{stem}_masks.{ext}")
    };
    match output {
        Some(out) if many || out.is_dir() => out.join(annotated_name()),
        Some(out) => out.to_path_buf(),
        None => input.with_file_name(annotated_name()),
    }
}

fn describe_file(path: &Path) -> String {
    if path.is_file() {
        path.display().to_string()
    } else {
        format!("{} (missing)", path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_output_path_defaults_next_to_input() {
        let path = output_path(Path::new("/data/crowd.png"), None, false);
        assert_eq!(path, PathBuf::from("/data/crowd_masks.png"));
    }

    #[test]
    fn test_output_path_single_file() {
        let path = output_path(Path::new("a.jpg"), Some(Path::new("out.jpg")), false);
        assert_eq!(path, PathBuf::from("out.jpg"));
    }

    #[test]
    fn test_output_path_directory_for_many() {
        let path = output_path(Path::new("in/a.jpg"), Some(Path::new("out")), true);
        assert_eq!(path, PathBuf::from("out/a_masks.jpg"));
    }

    #[test]
    fn test_global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "maskwatch",
            "camera",
            "--out-dir",
            "frames",
            "--detector",
            "fd.bin",
        ])
        .unwrap();
        assert_eq!(cli.detector, Some(PathBuf::from("fd.bin")));
        assert!(matches!(cli.command, Command::Camera { index: 0, .. }));
    }

    #[test]
    fn test_zero_max_frames_rejected() {
        assert!(check_max_frames(Some(0)).is_err());
        assert!(check_max_frames(Some(1)).is_ok());
        assert!(check_max_frames(None).is_ok());
    }

    #[test]
    fn test_missing_image_rejected() {
        let cli = Cli::try_parse_from(["maskwatch", "image", "/nonexistent/face.png"]).unwrap();
        let err = validate(&cli).unwrap_err();
        assert!(err.to_string().contains("Input file not found"));
    }
}
