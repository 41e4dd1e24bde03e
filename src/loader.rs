use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    catalog::FrameId,
    error::{FrameloomError, FrameloomResult},
};

/// Decoded 8-bit RGB frame, `width * height * 3` bytes in row-major order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRgb {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameRgb {
    pub fn from_rgb8(img: image::RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }

    /// Trim an odd right column and bottom row. yuv420p encoding needs even
    /// dimensions, so frames are brought down to the size the writer declares.
    pub fn even_cropped(self) -> Self {
        let (w, h) = (self.width & !1, self.height & !1);
        if (w, h) == (self.width, self.height) {
            return self;
        }
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            let row = (y * self.width) as usize * 3;
            data.extend_from_slice(&self.data[row..row + w as usize * 3]);
        }
        Self {
            width: w,
            height: h,
            data,
        }
    }
}

/// Geometric correction applied to every decoded frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipMode {
    #[default]
    None,
    Horizontal,
    Vertical,
    Both,
}

/// Decode one frame and apply the flip transform.
///
/// A matched filename that fails to decode is a fatal error carrying the path;
/// skipping it would silently desynchronize the output frame count.
pub fn load(path: &Path, flip: FlipMode) -> FrameloomResult<FrameRgb> {
    let img = image::open(path)
        .map_err(|e| FrameloomError::decode(format!("'{}': {e}", path.display())))?;

    let img = match flip {
        FlipMode::None => img,
        FlipMode::Horizontal => img.fliph(),
        FlipMode::Vertical => img.flipv(),
        FlipMode::Both => img.fliph().flipv(),
    };

    Ok(FrameRgb::from_rgb8(img.to_rgb8()))
}

/// Load a whole batch across the worker pool, preserving input order.
pub fn load_batch(
    pool: &rayon::ThreadPool,
    ids: &[FrameId],
    flip: FlipMode,
) -> FrameloomResult<Vec<FrameRgb>> {
    load_batch_with(pool, ids, |id| load(&id.path, flip))
}

/// Order preservation is a hard contract: the output index of each result
/// equals its input index regardless of which decode finishes first, enforced
/// by indexed parallel collection rather than completion order.
pub fn load_batch_with<F>(
    pool: &rayon::ThreadPool,
    ids: &[FrameId],
    f: F,
) -> FrameloomResult<Vec<FrameRgb>>
where
    F: Fn(&FrameId) -> FrameloomResult<FrameRgb> + Sync,
{
    let results = pool.install(|| ids.par_iter().map(&f).collect::<Vec<_>>());

    let mut out = Vec::with_capacity(results.len());
    for item in results {
        out.push(item?);
    }
    Ok(out)
}
