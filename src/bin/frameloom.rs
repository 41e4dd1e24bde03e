use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, ValueEnum};

use frameloom::{
    AssembleConfig, BracketConfig, Codec, Container, FlipMode, LogProgress, Resolution, ToneMap,
};

/// Assemble numbered frame scans from a directory into a single video.
///
/// Frames are matched by stem (`frame00001a.png` style: 5 digits plus an
/// exposure letter). With `--bracket`, a/b/c exposure triplets are merged into
/// HDR and tone-mapped. Fully explicit tone-map parameters can be given via
/// `--config` (JSON form of the run configuration); the flags below cover
/// operator and preset selection.
#[derive(Parser, Debug)]
#[command(name = "frameloom", version)]
struct Cli {
    /// Directory containing the frame files.
    #[arg(short = 'p', long = "path", default_value = ".")]
    path: PathBuf,

    /// Output directory for the generated movie.
    #[arg(short = 'o', long = "output-path", default_value = ".")]
    output_path: PathBuf,

    /// Movie name (without extension).
    #[arg(long, default_value = "frameloom-movie")]
    name: String,

    /// Frames per second, usually 18, 21 or 24.
    #[arg(long, default_value_t = 24)]
    fps: u32,

    /// Frames loaded per batch.
    #[arg(long, default_value_t = 64)]
    batch_size: usize,

    /// Decode worker count (defaults to the available parallelism).
    #[arg(long)]
    workers: Option<usize>,

    /// Geometric correction applied to every frame.
    #[arg(long, value_enum, default_value_t = FlipChoice::None)]
    flip: FlipChoice,

    /// Explicit output width; omit (with --height) for automatic detection.
    #[arg(long, requires = "height")]
    width: Option<u32>,

    /// Explicit output height; omit (with --width) for automatic detection.
    #[arg(long, requires = "width")]
    height: Option<u32>,

    /// Video codec.
    #[arg(long, default_value = "h264")]
    codec: String,

    /// Container format.
    #[arg(long, default_value = "mp4")]
    format: String,

    /// Treat the input as exposure-bracketed a/b/c triplets and HDR-merge them.
    #[arg(long)]
    bracket: bool,

    /// Tone-map operator: drago, reinhard or mantiuk.
    #[arg(long, default_value = "drago")]
    tonemap: String,

    /// Tone-map preset: default, cinematic, natural, highlight, soft, vivid
    /// or neutral.
    #[arg(long, default_value = "default")]
    preset: String,

    /// Exposure times of the a/b/c captures in seconds, comma-separated.
    #[arg(long, default_value = "0.008333,0.016667,0.033333")]
    exposure_times: String,

    /// Sprocket-edge columns cropped from the left before the HDR merge.
    #[arg(long, default_value_t = 0)]
    left_crop: u32,

    /// Sprocket-edge columns cropped from the right before the HDR merge.
    #[arg(long, default_value_t = 0)]
    right_crop: u32,

    /// Histogram bins below this fraction of total pixels are collapsed.
    #[arg(long, default_value_t = frameloom::hdr::DEFAULT_MIN_FRACTION)]
    min_fraction: f32,

    /// Load the whole run configuration from a JSON file instead of flags.
    #[arg(long, conflicts_with_all = [
        "path", "output_path", "name", "fps", "batch_size", "workers", "flip",
        "width", "height", "codec", "format", "bracket", "tonemap", "preset",
        "exposure_times", "left_crop", "right_crop", "min_fraction",
    ])]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FlipChoice {
    None,
    Horizontal,
    Vertical,
    Both,
}

impl From<FlipChoice> for FlipMode {
    fn from(c: FlipChoice) -> Self {
        match c {
            FlipChoice::None => FlipMode::None,
            FlipChoice::Horizontal => FlipMode::Horizontal,
            FlipChoice::Vertical => FlipMode::Vertical,
            FlipChoice::Both => FlipMode::Both,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => read_config_json(path)?,
        None => build_config(&cli)?,
    };

    let stats = frameloom::assemble(&config, &mut LogProgress::default())?;
    eprintln!(
        "wrote {} ({} frames, {:.2}s)",
        config.out_path().display(),
        stats.frames_written,
        stats.elapsed_ms as f64 / 1000.0
    );
    Ok(())
}

fn read_config_json(path: &Path) -> anyhow::Result<AssembleConfig> {
    let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
    let config: AssembleConfig =
        serde_json::from_reader(BufReader::new(f)).with_context(|| "parse config JSON")?;
    Ok(config)
}

fn build_config(cli: &Cli) -> anyhow::Result<AssembleConfig> {
    let resolution = match (cli.width, cli.height) {
        (Some(width), Some(height)) => Resolution::Explicit { width, height },
        _ => Resolution::Automatic,
    };

    let bracketing = if cli.bracket {
        Some(BracketConfig {
            exposure_times: parse_exposure_times(&cli.exposure_times)?,
            left_crop: cli.left_crop,
            right_crop: cli.right_crop,
            min_fraction: cli.min_fraction,
            tonemap: ToneMap::preset(&cli.tonemap, &cli.preset)?,
        })
    } else {
        None
    };

    let workers = match cli.workers {
        Some(n) => n,
        None => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
    };

    Ok(AssembleConfig {
        input_dir: cli.path.clone(),
        output_dir: cli.output_path.clone(),
        base_name: cli.name.clone(),
        container: Container::from_name(&cli.format)?,
        codec: Codec::from_name(&cli.codec)?,
        fps: cli.fps,
        batch_size: cli.batch_size,
        workers,
        flip: cli.flip.into(),
        resolution,
        bracketing,
    })
}

fn parse_exposure_times(s: &str) -> anyhow::Result<[f32; 3]> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("parse exposure times '{s}'"))?;
    let [a, b, c] = parts.as_slice() else {
        anyhow::bail!("expected exactly 3 comma-separated exposure times, got {}", parts.len());
    };
    Ok([*a, *b, *c])
}
