use align_cli::{AlignConfig, AlignError, Aligner, AlignmentOutput, PairStatus, RasterImage};
use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use flexi_logger::Logger;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageReader, Rgb};
use imageproc::drawing::draw_hollow_circle_mut;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

/// Erosion radius used when neither `--erode` nor a config file sets one.
const DEFAULT_EROSION: u8 = 25;

#[derive(Parser)]
#[command(name = "open-align")]
#[command(about = "Align overlapping photographs onto the first one and crop them to their common area")]
#[command(version)]
struct Cli {
    /// Log filter, e.g. "info" or "debug,align_ransac=trace".
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Align images onto the first one.
    Align(AlignArgs),
}

#[derive(Debug, Clone, Args)]
struct AlignArgs {
    /// Input images; the first is the reference.
    #[arg(required = true, num_args = 2..)]
    files: Vec<PathBuf>,

    /// Maximum number of ORB features per image.
    #[arg(long)]
    nfeatures: Option<usize>,

    /// Lowe ratio for descriptor matching.
    #[arg(long)]
    ratio: Option<f32>,

    /// Erosion radius applied to the combined validity mask (default: 25).
    #[arg(long)]
    erode: Option<u8>,

    /// Output directory.
    #[arg(long, default_value = "aligned")]
    out: PathBuf,

    /// Load settings from a TOML or JSON file; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker threads (default: all cores).
    #[arg(long)]
    threads: Option<usize>,

    /// RANSAC seed for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,

    /// Write full-canvas aligned images only.
    #[arg(long)]
    no_crop: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _logger = match Logger::try_with_str(&cli.log_level).and_then(|logger| logger.start()) {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("failed to initialise logging: {err}");
            return ExitCode::from(1);
        }
    };

    let result = match cli.command {
        Commands::Align(args) => run_align(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<AlignError>() {
        Some(AlignError::NoCandidatesAligned { .. }) => 2,
        Some(AlignError::NoOverlap(_)) => 3,
        _ => 1,
    }
}

fn build_config(args: &AlignArgs) -> anyhow::Result<AlignConfig> {
    let mut config = match &args.config {
        Some(path) => AlignConfig::load(path)
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let mut config = AlignConfig::default();
            config.overlap.erosion_radius = DEFAULT_EROSION;
            config
        }
    };

    if let Some(n) = args.nfeatures {
        config.orb.n_features = n;
    }
    if let Some(ratio) = args.ratio {
        config.matching.ratio = ratio;
    }
    if let Some(radius) = args.erode {
        config.overlap.erosion_radius = radius;
    }
    if let Some(threads) = args.threads {
        config.n_threads = threads;
    }
    if let Some(seed) = args.seed {
        config.ransac.seed = Some(seed);
    }
    Ok(config)
}

fn load_images(files: &[PathBuf]) -> anyhow::Result<Vec<RasterImage>> {
    if let Some(missing) = files.iter().find(|path| !path.is_file()) {
        bail!("input file {} does not exist", missing.display());
    }
    files
        .iter()
        .map(|path| {
            let img = ImageReader::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?
                .decode()
                .with_context(|| format!("failed to decode {}", path.display()))?;
            log::debug!("loaded {} ({}x{})", path.display(), img.width(), img.height());
            Ok(img.to_rgb8())
        })
        .collect()
}

fn run_align(args: &AlignArgs) -> anyhow::Result<()> {
    let config = build_config(args)?;
    let aligner = Aligner::new(config)?;
    let images = load_images(&args.files)?;

    let t0 = Instant::now();
    let output = aligner.align(&images)?;
    log::info!("alignment took {:.2?}", t0.elapsed());

    print_report(args, &output);

    fs::create_dir_all(&args.out).with_context(|| format!("failed to create {}", args.out.display()))?;
    write_outputs(&args.out, &output, !args.no_crop)?;
    write_match_overlay(&args.out.join("ref_matches_all.png"), &images[0], &output)?;
    Ok(())
}

fn print_report(args: &AlignArgs, output: &AlignmentOutput) {
    println!("reference {}: {} keypoints", args.files[0].display(), output.reference_keypoints.len());
    for pair in &output.pairs {
        let name = args.files[pair.index].display();
        match &pair.status {
            PairStatus::Aligned => {
                let (tx, ty) = pair.transform.map(|t| t.translation()).unwrap_or_default();
                println!(
                    "{name}: {} keypoints, {} matches, {} inliers, shift ({tx:.1}, {ty:.1})",
                    pair.cand_keypoints, pair.correspondences, pair.inliers
                );
            }
            PairStatus::Skipped { stage, reason } => {
                println!("{name}: skipped at {stage:?}: {reason}");
            }
        }
    }
    let o = &output.overlap;
    println!(
        "{} of {} candidates aligned, common area {}x{} at ({}, {})",
        output.aligned_count(),
        output.pairs.len(),
        o.width,
        o.height,
        o.x,
        o.y
    );
}

fn write_outputs(dir: &Path, output: &AlignmentOutput, crop: bool) -> anyhow::Result<()> {
    for aligned in &output.aligned {
        let path = dir.join(format!("aligned_{:03}.png", aligned.index()));
        aligned
            .image()
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    if !crop {
        return Ok(());
    }
    for (aligned, cropped) in output.aligned.iter().zip(output.crop_all()) {
        let path = dir.join(format!("aligned_cropped_{:03}.jpg", aligned.index()));
        let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        JpegEncoder::new_with_quality(BufWriter::new(file), 100)
            .encode_image(&cropped)
            .with_context(|| format!("failed to encode {}", path.display()))?;
    }
    log::info!("wrote {} images to {}", output.aligned.len(), dir.display());
    Ok(())
}

/// Reference image with every matched reference keypoint circled in red.
fn write_match_overlay(path: &Path, reference: &RasterImage, output: &AlignmentOutput) -> anyhow::Result<()> {
    let mut overlay = reference.clone();
    for kp in output.matched_reference_keypoints() {
        let radius = (kp.size / 2.0).round().max(3.0) as i32;
        draw_hollow_circle_mut(&mut overlay, (kp.x.round() as i32, kp.y.round() as i32), radius, Rgb([255, 0, 0]));
    }
    overlay
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}
