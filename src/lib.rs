#![forbid(unsafe_code)]

pub mod assemble;
pub mod catalog;
pub mod encode_ffmpeg;
pub mod error;
pub mod hdr;
pub mod loader;
pub mod plan;
pub mod progress;
pub mod tonemap;

pub use assemble::{
    AssembleConfig, AssembleStats, BracketConfig, Resolution, assemble,
};
pub use catalog::{Exposure, FrameId, scan};
pub use encode_ffmpeg::{Codec, Container, EncodeConfig, FfmpegWriter, is_ffmpeg_on_path};
pub use error::{FrameloomError, FrameloomResult};
pub use hdr::{HdrImage, HdrMerger};
pub use loader::{FlipMode, FrameRgb, load, load_batch, load_batch_with};
pub use plan::{BatchPlan, MAX_BATCH_SIZE};
pub use progress::{LogProgress, NoProgress, Progress};
pub use tonemap::ToneMap;
