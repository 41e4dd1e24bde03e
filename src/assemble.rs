use std::{path::PathBuf, time::Instant};

use rand::Rng as _;
use serde::{Deserialize, Serialize};

use crate::{
    catalog::{self, FrameId},
    encode_ffmpeg::{Codec, Container, EncodeConfig, FfmpegWriter},
    error::{FrameloomError, FrameloomResult},
    hdr::{DEFAULT_MIN_FRACTION, HdrMerger},
    loader::{self, FlipMode, FrameRgb},
    plan::BatchPlan,
    progress::Progress,
    tonemap::ToneMap,
};

/// Smallest dimension accepted as an explicit resolution; anything below it
/// falls back to [`DEFAULT_RESOLUTION`].
pub const MIN_DIMENSION: u32 = 32;
pub const DEFAULT_RESOLUTION: (u32, u32) = (1920, 1080);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Resolution {
    /// Decode one uniformly-random frame of the sequence and use its size.
    #[default]
    Automatic,
    Explicit {
        width: u32,
        height: u32,
    },
}

/// Exposure-bracketing surface: merge parameters plus tone-map selection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BracketConfig {
    /// Exposure times of the a/b/c captures, in seconds.
    pub exposure_times: [f32; 3],
    /// Unexposed sprocket-edge columns removed before merge, restored after.
    pub left_crop: u32,
    pub right_crop: u32,
    /// Histogram bins below this fraction of total pixels are collapsed.
    pub min_fraction: f32,
    pub tonemap: ToneMap,
}

impl Default for BracketConfig {
    fn default() -> Self {
        Self {
            exposure_times: [1.0 / 120.0, 1.0 / 60.0, 1.0 / 30.0],
            left_crop: 0,
            right_crop: 0,
            min_fraction: DEFAULT_MIN_FRACTION,
            tonemap: ToneMap::Drago { bias: 0.85 },
        }
    }
}

/// Fully resolved assembly run configuration.
///
/// Built by the CLI (or deserialized from JSON) and validated once, before any
/// directory scan or writer resource is touched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssembleConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Output file is `output_dir/base_name.<container extension>`.
    pub base_name: String,
    #[serde(default)]
    pub container: Container,
    #[serde(default)]
    pub codec: Codec,
    pub fps: u32,
    pub batch_size: usize,
    /// Decode worker count, independent of the CPU count.
    pub workers: usize,
    #[serde(default)]
    pub flip: FlipMode,
    #[serde(default)]
    pub resolution: Resolution,
    /// `Some` enables the exposure-bracketed HDR merge path.
    #[serde(default)]
    pub bracketing: Option<BracketConfig>,
}

impl AssembleConfig {
    pub fn validate(&self) -> FrameloomResult<()> {
        if self.base_name.is_empty() {
            return Err(FrameloomError::config("output base name must be non-empty"));
        }
        if self.fps == 0 {
            return Err(FrameloomError::config("fps must be non-zero"));
        }
        if self.workers == 0 {
            return Err(FrameloomError::config("worker count must be >= 1"));
        }
        if let Some(b) = &self.bracketing {
            // Constructing the merger runs the full parameter validation.
            HdrMerger::new(
                b.exposure_times,
                b.left_crop,
                b.right_crop,
                b.min_fraction,
                b.tonemap,
            )?;
        }
        Ok(())
    }

    pub fn out_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", self.base_name, self.container.extension()))
    }
}

/// One frame-group processor, selected once at configuration time: either the
/// identity for plain sequences or the HDR merge for bracketed ones.
enum GroupProcessor {
    PassThrough,
    HdrMerge(HdrMerger),
}

impl GroupProcessor {
    fn group_size(&self) -> usize {
        match self {
            Self::PassThrough => 1,
            Self::HdrMerge(_) => 3,
        }
    }

    fn process(&self, group: &[FrameRgb]) -> FrameloomResult<FrameRgb> {
        if group.len() != self.group_size() {
            return Err(FrameloomError::decode(format!(
                "frame group of {} does not match group size {}",
                group.len(),
                self.group_size()
            )));
        }
        match self {
            Self::PassThrough => Ok(group[0].clone()),
            Self::HdrMerge(merger) => merger.merge([&group[0], &group[1], &group[2]]),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssembleStats {
    pub frames_scanned: usize,
    pub frames_written: u64,
    pub batches: usize,
    pub elapsed_ms: u128,
}

/// Assemble the configured frame directory into one video file.
///
/// Batches are processed strictly sequentially; within a batch, decoding fans
/// out across a pool built once for the run. Output frame order always equals
/// catalog order. A decode failure aborts the run; the partially written
/// output file is left on disk.
pub fn assemble(
    config: &AssembleConfig,
    progress: &mut dyn Progress,
) -> FrameloomResult<AssembleStats> {
    let started = Instant::now();
    config.validate()?;

    let bracketing = config.bracketing.is_some();
    let mut sequence = catalog::scan(&config.input_dir, bracketing)?;
    if sequence.is_empty() {
        return Err(FrameloomError::catalog(format!(
            "no frame files matched in '{}'",
            config.input_dir.display()
        )));
    }

    let processor = match &config.bracketing {
        None => GroupProcessor::PassThrough,
        Some(b) => GroupProcessor::HdrMerge(HdrMerger::new(
            b.exposure_times,
            b.left_crop,
            b.right_crop,
            b.min_fraction,
            b.tonemap,
        )?),
    };
    let group_size = processor.group_size();

    // A trailing partial exposure group can never be merged; drop it rather
    // than failing a whole capture run, and say so.
    let usable = sequence.len() / group_size * group_size;
    if usable < sequence.len() {
        tracing::warn!(
            dropped = sequence.len() - usable,
            "dropping trailing frames that do not form a complete exposure group"
        );
        sequence.truncate(usable);
        if sequence.is_empty() {
            return Err(FrameloomError::catalog(
                "no complete exposure group in the input directory",
            ));
        }
    }

    let (width, height) = resolve_resolution(config, &sequence)?;
    let total_out = (sequence.len() / group_size) as u64;

    let pool = build_thread_pool(config.workers)?;
    let mut writer = FfmpegWriter::new(EncodeConfig {
        width,
        height,
        fps: config.fps,
        codec: config.codec,
        container: config.container,
        out_path: config.out_path(),
        overwrite: true,
    })?;

    let plan = BatchPlan::new(sequence.len(), config.batch_size, group_size);
    let batch_count = plan.batch_count();
    tracing::info!(
        frames = sequence.len(),
        output_frames = total_out,
        batches = batch_count,
        batch_size = plan.batch_size(),
        width,
        height,
        fps = config.fps,
        "assembling video"
    );

    for (i, range) in plan.batches().enumerate() {
        tracing::debug!(batch = i + 1, of = batch_count, ?range, "writing batch");
        let frames = loader::load_batch(&pool, &sequence[range], config.flip)?;
        for group in frames.chunks(group_size) {
            // Odd source dimensions get the same even trim the declared
            // resolution did, so uniform odd-sized catalogs encode cleanly.
            let frame = processor.process(group)?.even_cropped();
            writer.write_frame(&frame)?;
            progress.frame_written(writer.frames_written(), total_out);
        }
    }

    writer.finish()?;
    drop(pool);

    let stats = AssembleStats {
        frames_scanned: sequence.len(),
        frames_written: total_out,
        batches: batch_count,
        elapsed_ms: started.elapsed().as_millis(),
    };
    tracing::info!(
        frames = stats.frames_written,
        elapsed_ms = stats.elapsed_ms,
        "end of film"
    );
    Ok(stats)
}

/// Explicit resolution below the sane minimum falls back to the default;
/// automatic resolution decodes one uniformly-random frame of the sequence.
fn resolve_resolution(
    config: &AssembleConfig,
    sequence: &[FrameId],
) -> FrameloomResult<(u32, u32)> {
    match config.resolution {
        Resolution::Explicit { width, height } => {
            if width < MIN_DIMENSION || height < MIN_DIMENSION {
                tracing::warn!(
                    width,
                    height,
                    "explicit resolution below {MIN_DIMENSION}px; falling back to {}x{}",
                    DEFAULT_RESOLUTION.0,
                    DEFAULT_RESOLUTION.1
                );
                Ok(DEFAULT_RESOLUTION)
            } else {
                Ok((width, height))
            }
        }
        Resolution::Automatic => {
            let idx = rand::rng().random_range(0..sequence.len());
            let probe = loader::load(&sequence[idx].path, FlipMode::None)?;
            // yuv420p encoding needs even dimensions.
            let (w, h) = (probe.width & !1, probe.height & !1);
            tracing::info!(
                probe = %sequence[idx].path.display(),
                width = w,
                height = h,
                "auto-detected output resolution"
            );
            if w < MIN_DIMENSION || h < MIN_DIMENSION {
                return Err(FrameloomError::config(format!(
                    "auto-detected resolution {w}x{h} is below the {MIN_DIMENSION}px minimum"
                )));
            }
            Ok((w, h))
        }
    }
}

fn build_thread_pool(workers: usize) -> FrameloomResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build decode thread pool: {e}").into())
}
