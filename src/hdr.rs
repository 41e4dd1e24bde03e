use crate::{
    error::{FrameloomError, FrameloomResult},
    loader::FrameRgb,
    tonemap::ToneMap,
};

/// Transient linear floating-point RGB image produced by the exposure merge.
/// Lives only for the duration of one exposure group.
#[derive(Clone, Debug)]
pub struct HdrImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

/// Estimated camera response: linear radiance per 8-bit code value, one table
/// per channel.
struct CameraResponse {
    channels: [[f32; 256]; 3],
}

// Debevec hat weighting: trust mid-range code values, distrust both ends.
fn weight(z: u8) -> f32 {
    if z <= 127 {
        (z as f32 + 1.0) / 128.0
    } else {
        (256.0 - z as f32) / 128.0
    }
}

// Cap on calibration samples; beyond this the images are strided.
const CALIBRATION_SAMPLES: usize = 65_536;

impl CameraResponse {
    /// Derive the response from a bracketed triplet and its exposure times.
    ///
    /// Starts from a linear response and applies one Robertson-style
    /// refinement: estimate per-pixel radiance from the current response, then
    /// re-estimate each code value's radiance as the weighted mean of
    /// `radiance * time` over the samples that produced it. The result is
    /// forced monotonic and normalized to end at 1.
    fn calibrate(images: [&FrameRgb; 3], times: [f32; 3]) -> Self {
        let px_count = (images[0].data.len() / 3).max(1);
        let stride = px_count.div_ceil(CALIBRATION_SAMPLES).max(1);

        let mut channels = [[0.0f32; 256]; 3];
        for (ch, response) in channels.iter_mut().enumerate() {
            let initial = |z: u8| (z as f32 + 0.5) / 255.5;

            let mut sum = [0.0f32; 256];
            let mut wsum = [0.0f32; 256];
            for px in (0..px_count).step_by(stride) {
                // Radiance estimate under the current (linear) response.
                let mut num = 0.0f32;
                let mut den = 0.0f32;
                for (img, &t) in images.iter().zip(&times) {
                    let z = img.data[px * 3 + ch];
                    let w = weight(z);
                    num += w * initial(z) / t;
                    den += w;
                }
                if den <= f32::EPSILON {
                    continue;
                }
                let radiance = num / den;

                for (img, &t) in images.iter().zip(&times) {
                    let z = img.data[px * 3 + ch] as usize;
                    let w = weight(img.data[px * 3 + ch]);
                    sum[z] += w * radiance * t;
                    wsum[z] += w;
                }
            }

            for z in 0..256 {
                response[z] = if wsum[z] > f32::EPSILON {
                    sum[z] / wsum[z]
                } else {
                    initial(z as u8)
                };
            }
            // Monotonic by construction of the model; enforce it against
            // sampling noise, then normalize the top to 1.
            for z in 1..256 {
                response[z] = response[z].max(response[z - 1]);
            }
            let top = response[255].max(f32::EPSILON);
            for v in response.iter_mut() {
                *v = (*v / top).max(1e-6);
            }
        }

        Self { channels }
    }
}

/// Exposure-bracket merger: crops the unexposed frame edge, calibrates a
/// camera response, merges the triplet into linear HDR, compresses rare
/// extreme intensities, tone-maps, pads the edge back and quantizes to 8-bit.
#[derive(Clone, Copy, Debug)]
pub struct HdrMerger {
    pub exposure_times: [f32; 3],
    pub left_crop: u32,
    pub right_crop: u32,
    pub min_fraction: f32,
    pub tonemap: ToneMap,
}

pub const DEFAULT_MIN_FRACTION: f32 = 0.0005;

impl HdrMerger {
    pub fn new(
        exposure_times: [f32; 3],
        left_crop: u32,
        right_crop: u32,
        min_fraction: f32,
        tonemap: ToneMap,
    ) -> FrameloomResult<Self> {
        if exposure_times.iter().any(|&t| t <= 0.0) {
            return Err(FrameloomError::config(
                "exposure times must all be positive",
            ));
        }
        if !(0.0..1.0).contains(&min_fraction) {
            return Err(FrameloomError::config(
                "tone-map min fraction must be in [0, 1)",
            ));
        }
        Ok(Self {
            exposure_times,
            left_crop,
            right_crop,
            min_fraction,
            tonemap,
        })
    }

    /// Merge one exposure group, ordered under/normal/over, into a single
    /// displayable frame with the group's original dimensions.
    pub fn merge(&self, triplet: [&FrameRgb; 3]) -> FrameloomResult<FrameRgb> {
        let (width, height) = (triplet[0].width, triplet[0].height);
        for img in &triplet {
            if img.width != width || img.height != height {
                return Err(FrameloomError::decode(format!(
                    "bracketed triplet is misaligned: {}x{} vs {width}x{height}",
                    img.width, img.height
                )));
            }
        }
        // Widened so absurd crop values error out instead of overflowing.
        if u64::from(self.left_crop) + u64::from(self.right_crop) >= u64::from(width) {
            return Err(FrameloomError::config(format!(
                "crop {}+{} exceeds frame width {width}",
                self.left_crop, self.right_crop
            )));
        }

        // The sprocket/frame edge is unexposed and would skew the response
        // estimate, so it is removed before calibration and restored after.
        let cropped: Vec<FrameRgb> = triplet
            .iter()
            .map(|img| crop_columns(img, self.left_crop, self.right_crop))
            .collect();
        let cropped = [&cropped[0], &cropped[1], &cropped[2]];

        let response = CameraResponse::calibrate(cropped, self.exposure_times);
        let mut hdr = merge_radiance(cropped, self.exposure_times, &response);

        count_tonemap(&mut hdr, self.min_fraction);
        self.tonemap.apply(&mut hdr);

        let hdr = pad_columns_reflected(&hdr, self.left_crop, self.right_crop);
        Ok(quantize(&hdr))
    }
}

fn crop_columns(img: &FrameRgb, left: u32, right: u32) -> FrameRgb {
    let new_width = img.width - left - right;
    let mut data = Vec::with_capacity((new_width * img.height * 3) as usize);
    for y in 0..img.height {
        let row = (y * img.width) as usize * 3;
        let start = row + left as usize * 3;
        let end = row + (left + new_width) as usize * 3;
        data.extend_from_slice(&img.data[start..end]);
    }
    FrameRgb {
        width: new_width,
        height: img.height,
        data,
    }
}

/// Debevec merge in log-exposure space: weighted mean of
/// `ln(response(z)) - ln(t)` across the three exposures.
fn merge_radiance(images: [&FrameRgb; 3], times: [f32; 3], response: &CameraResponse) -> HdrImage {
    let (width, height) = (images[0].width, images[0].height);
    let px_count = (width * height) as usize;
    let log_times = times.map(f32::ln);

    let mut data = vec![0.0f32; px_count * 3];
    for px in 0..px_count {
        for ch in 0..3 {
            let mut num = 0.0f32;
            let mut den = 0.0f32;
            for (j, img) in images.iter().enumerate() {
                let z = img.data[px * 3 + ch];
                let w = weight(z);
                num += w * (response.channels[ch][z as usize].ln() - log_times[j]);
                den += w;
            }
            // Fully saturated in every exposure: fall back to the normal one.
            let log_e = if den > f32::EPSILON {
                num / den
            } else {
                let z = images[1].data[px * 3 + ch];
                response.channels[ch][z as usize].ln() - log_times[1]
            };
            data[px * 3 + ch] = log_e.exp();
        }
    }

    HdrImage {
        width,
        height,
        data,
    }
}

/// Histogram outlier compression. Bins whose population falls below
/// `min_fraction` of the total are treated as under-represented and their
/// intensity range is collapsed: every value at or above such a bin moves down
/// by one bin width, ascending over all bins. The result is min-max rescaled
/// to [0, 1]. Suppresses hot pixels and specular glints that would otherwise
/// dominate tone mapping.
fn count_tonemap(img: &mut HdrImage, min_fraction: f32) {
    const BINS: usize = 256;

    let min = img.data.iter().copied().fold(f32::INFINITY, f32::min);
    let max = img.data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !min.is_finite() || !max.is_finite() || max - min <= f32::EPSILON {
        img.data.fill(0.0);
        return;
    }
    let bin_width = (max - min) / BINS as f32;

    let bin_of = |v: f32| (((v - min) / bin_width) as usize).min(BINS - 1);
    let mut counts = [0usize; BINS];
    for &v in &img.data {
        counts[bin_of(v)] += 1;
    }

    let threshold = min_fraction * img.data.len() as f32;
    // shift[b]: total downward shift for a value whose original bin is b,
    // one bin width per under-represented bin at or below it.
    let mut shift = [0.0f32; BINS];
    let mut acc = 0.0f32;
    for (b, &count) in counts.iter().enumerate() {
        if (count as f32) < threshold {
            acc += bin_width;
        }
        shift[b] = acc;
    }

    for v in &mut img.data {
        *v -= shift[bin_of(*v)];
    }

    let new_min = img.data.iter().copied().fold(f32::INFINITY, f32::min);
    let new_max = img.data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = (new_max - new_min).max(f32::EPSILON);
    for v in &mut img.data {
        *v = (*v - new_min) / range;
    }
}

/// Restore cropped columns by mirroring about the edge pixel (reflect-101),
/// so the output matches the configured frame width exactly.
fn pad_columns_reflected(img: &HdrImage, left: u32, right: u32) -> HdrImage {
    if left == 0 && right == 0 {
        return img.clone();
    }
    let w = img.width as i64;
    let new_width = img.width + left + right;
    let mut data = Vec::with_capacity((new_width * img.height * 3) as usize);
    for y in 0..img.height {
        let row = (y * img.width) as usize * 3;
        for x in -(left as i64)..(w + right as i64) {
            let src = reflect_101(x, w) as usize;
            let base = row + src * 3;
            data.extend_from_slice(&img.data[base..base + 3]);
        }
    }
    HdrImage {
        width: new_width,
        height: img.height,
        data,
    }
}

fn reflect_101(mut x: i64, len: i64) -> i64 {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    x = x.rem_euclid(period);
    if x >= len { period - x } else { x }
}

/// `[0,1]` float to 8-bit: multiply by 256 and truncate, clamped to 255.
/// Matches the declared bit depth of the video writer.
fn quantize(img: &HdrImage) -> FrameRgb {
    let data = img
        .data
        .iter()
        .map(|&v| ((v * 256.0) as i32).clamp(0, 255) as u8)
        .collect();
    FrameRgb {
        width: img.width,
        height: img.height,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bracket(width: u32, height: u32) -> [FrameRgb; 3] {
        // Synthetic bracket of one gradient scene at three exposures.
        [0.5f32, 1.0, 2.0].map(|gain| {
            let mut data = Vec::with_capacity((width * height * 3) as usize);
            for i in 0..(width * height) {
                let base = 30.0 + 180.0 * (i as f32 / (width * height) as f32);
                let v = (base * gain).clamp(0.0, 255.0) as u8;
                data.extend_from_slice(&[v, v / 2 + 10, 255 - v]);
            }
            FrameRgb {
                width,
                height,
                data,
            }
        })
    }

    fn merger() -> HdrMerger {
        HdrMerger::new(
            [1.0 / 120.0, 1.0 / 60.0, 1.0 / 30.0],
            2,
            2,
            DEFAULT_MIN_FRACTION,
            ToneMap::from_name("drago").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn merge_preserves_original_dimensions() {
        let [a, b, c] = bracket(16, 8);
        let out = merger().merge([&a, &b, &c]).unwrap();
        assert_eq!((out.width, out.height), (16, 8));
        assert_eq!(out.data.len(), 16 * 8 * 3);
    }

    #[test]
    fn merge_is_deterministic() {
        let [a, b, c] = bracket(12, 6);
        let m = merger();
        let first = m.merge([&a, &b, &c]).unwrap();
        let second = m.merge([&a, &b, &c]).unwrap();
        assert_eq!(first.data, second.data);
    }

    #[test]
    fn merge_rejects_misaligned_triplet() {
        let [a, b, _] = bracket(16, 8);
        let odd = FrameRgb {
            width: 8,
            height: 8,
            data: vec![0; 8 * 8 * 3],
        };
        let err = merger().merge([&a, &b, &odd]).unwrap_err();
        assert!(matches!(err, FrameloomError::Decode(_)));
    }

    #[test]
    fn merge_rejects_crop_wider_than_frame() {
        let [a, b, c] = bracket(4, 4);
        let m = HdrMerger::new(
            [0.01, 0.02, 0.04],
            2,
            2,
            DEFAULT_MIN_FRACTION,
            ToneMap::from_name("drago").unwrap(),
        )
        .unwrap();
        assert!(matches!(
            m.merge([&a, &b, &c]),
            Err(FrameloomError::Config(_))
        ));
    }

    #[test]
    fn merge_rejects_crop_sum_overflowing_u32() {
        let [a, b, c] = bracket(4, 4);
        let m = HdrMerger::new(
            [0.01, 0.02, 0.04],
            u32::MAX,
            u32::MAX,
            DEFAULT_MIN_FRACTION,
            ToneMap::from_name("drago").unwrap(),
        )
        .unwrap();
        assert!(matches!(
            m.merge([&a, &b, &c]),
            Err(FrameloomError::Config(_))
        ));
    }

    #[test]
    fn new_rejects_bad_parameters() {
        let tm = ToneMap::from_name("drago").unwrap();
        assert!(HdrMerger::new([0.0, 0.02, 0.04], 0, 0, 0.0005, tm).is_err());
        assert!(HdrMerger::new([0.01, 0.02, 0.04], 0, 0, 1.5, tm).is_err());
    }

    #[test]
    fn crop_and_reflect_pad_round_trip_dimensions() {
        let img = HdrImage {
            width: 3,
            height: 1,
            data: vec![0.1, 0.1, 0.1, 0.5, 0.5, 0.5, 0.9, 0.9, 0.9],
        };
        let padded = pad_columns_reflected(&img, 2, 1);
        assert_eq!(padded.width, 6);
        // Reflection about the edge pixel: columns [2,1,0,1,2,1].
        assert_eq!(padded.data[0], 0.9);
        assert_eq!(padded.data[3], 0.5);
        assert_eq!(padded.data[6], 0.1);
        assert_eq!(padded.data[15], 0.5);
    }

    #[test]
    fn count_tonemap_rescales_to_unit_range() {
        let mut img = HdrImage {
            width: 4,
            height: 1,
            data: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 200.0],
        };
        count_tonemap(&mut img, 0.1);
        let min = img.data.iter().copied().fold(f32::INFINITY, f32::min);
        let max = img.data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        assert_eq!(min, 0.0);
        assert_eq!(max, 1.0);
    }

    #[test]
    fn count_tonemap_collapses_outlier_gap() {
        // One hot value far above a tight cluster: the empty bins between
        // them collapse, pulling the outlier close to the cluster.
        let mut img = HdrImage {
            width: 3,
            height: 1,
            data: vec![1.0, 1.1, 1.2, 1.0, 1.1, 1.2, 1.05, 1.15, 100.0],
        };
        count_tonemap(&mut img, 0.2);
        let max_regular = img.data[..8].iter().copied().fold(0.0f32, f32::max);
        let outlier = img.data[8];
        // Before compression the outlier sat ~99% of the range above the
        // cluster; afterwards it is within roughly one bin width of it.
        assert!(outlier > max_regular, "ordering must be preserved");
        assert!(outlier - max_regular < 0.5, "outlier gap was not collapsed");
    }

    #[test]
    fn count_tonemap_flat_image_goes_to_zero() {
        let mut img = HdrImage {
            width: 2,
            height: 1,
            data: vec![3.0; 6],
        };
        count_tonemap(&mut img, 0.0005);
        assert!(img.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn quantize_truncates_and_clamps() {
        let img = HdrImage {
            width: 1,
            height: 1,
            data: vec![0.0, 0.5, 1.0],
        };
        let out = quantize(&img);
        assert_eq!(out.data, vec![0, 128, 255]);
    }
}
