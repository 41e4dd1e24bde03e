use serde::{Deserialize, Serialize};

use crate::{
    error::{FrameloomError, FrameloomResult},
    hdr::HdrImage,
};

/// Tone-mapping operator selection, fixed at configuration time.
///
/// Parameters follow the conventional operator signatures: Drago's adaptive
/// logarithmic mapping, Reinhard-Devlin photoreceptor adaptation and a
/// log-domain contrast-scaling Mantiuk variant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operator", rename_all = "snake_case")]
pub enum ToneMap {
    Drago {
        bias: f32,
    },
    Reinhard {
        gamma: f32,
        intensity: f32,
        light_adapt: f32,
        color_adapt: f32,
    },
    Mantiuk {
        scale: f32,
        saturation: f32,
        bias: f32,
    },
}

pub const PRESET_NAMES: [&str; 7] = [
    "default",
    "cinematic",
    "natural",
    "highlight",
    "soft",
    "vivid",
    "neutral",
];

impl ToneMap {
    /// Operator by name with its default parameters. Unknown names are a
    /// configuration error, rejected before any processing starts.
    pub fn from_name(operator: &str) -> FrameloomResult<Self> {
        Self::preset(operator, "default")
    }

    /// Operator by name with one of the pre-tuned parameter bundles.
    pub fn preset(operator: &str, preset: &str) -> FrameloomResult<Self> {
        if !PRESET_NAMES.contains(&preset) {
            return Err(FrameloomError::config(format!(
                "unknown tone-map preset '{preset}' (expected one of {PRESET_NAMES:?})"
            )));
        }
        let op = match operator {
            "drago" => {
                let bias = match preset {
                    "cinematic" => 0.95,
                    "highlight" => 0.7,
                    "soft" => 0.9,
                    "vivid" => 0.75,
                    _ => 0.85,
                };
                Self::Drago { bias }
            }
            "reinhard" => {
                let (intensity, light_adapt, color_adapt) = match preset {
                    "cinematic" => (-1.0, 0.8, 0.2),
                    "natural" => (0.0, 1.0, 0.1),
                    "highlight" => (1.0, 0.6, 0.0),
                    "soft" => (-0.5, 1.0, 0.0),
                    "vivid" => (0.5, 0.9, 0.6),
                    "neutral" => (0.0, 1.0, 0.0),
                    _ => (0.0, 1.0, 0.0),
                };
                Self::Reinhard {
                    gamma: 1.0,
                    intensity,
                    light_adapt,
                    color_adapt,
                }
            }
            "mantiuk" => {
                let (scale, saturation, bias) = match preset {
                    "cinematic" => (0.8, 0.9, 0.92),
                    "highlight" => (0.6, 1.0, 0.8),
                    "soft" => (0.75, 0.85, 0.9),
                    "vivid" => (0.7, 1.3, 0.85),
                    "neutral" => (0.7, 1.0, 0.85),
                    _ => (0.7, 1.0, 0.85),
                };
                Self::Mantiuk {
                    scale,
                    saturation,
                    bias,
                }
            }
            other => {
                return Err(FrameloomError::config(format!(
                    "unknown tone-map operator '{other}' (expected drago, reinhard or mantiuk)"
                )));
            }
        };
        Ok(op)
    }

    /// Map a linear [0,1] HDR image to displayable [0,1] in place.
    /// Deterministic: identical input and parameters give identical pixels.
    pub fn apply(&self, img: &mut HdrImage) {
        match *self {
            Self::Drago { bias } => drago(img, bias),
            Self::Reinhard {
                gamma,
                intensity,
                light_adapt,
                color_adapt,
            } => reinhard(img, gamma, intensity, light_adapt, color_adapt),
            Self::Mantiuk {
                scale,
                saturation,
                bias,
            } => mantiuk(img, scale, saturation, bias),
        }
    }
}

const EPS: f32 = 1e-6;

fn luminance(px: &[f32]) -> f32 {
    0.2126 * px[0] + 0.7152 * px[1] + 0.0722 * px[2]
}

fn max_luminance(img: &HdrImage) -> f32 {
    img.data
        .chunks_exact(3)
        .map(luminance)
        .fold(EPS, f32::max)
}

/// Scale each pixel's channels by a per-pixel luminance ratio.
fn scale_by_luminance(img: &mut HdrImage, f: impl Fn(f32) -> f32) {
    for px in img.data.chunks_exact_mut(3) {
        let lw = luminance(px).max(EPS);
        let ratio = f(lw) / lw;
        for c in px {
            *c = (*c * ratio).clamp(0.0, 1.0);
        }
    }
}

/// Drago et al. 2003 adaptive logarithmic mapping.
fn drago(img: &mut HdrImage, bias: f32) {
    let l_max = max_luminance(img);
    let bias_exp = bias.clamp(EPS, 1.0).ln() / 0.5f32.ln();
    let denom_scale = 1.0 / (l_max + 1.0).log10();
    scale_by_luminance(img, |lw| {
        let t = (lw / l_max).powf(bias_exp);
        denom_scale * (lw + 1.0).log10() / (2.0 + 8.0 * t).log10()
    });
}

/// Reinhard-Devlin photoreceptor model: global/local adaptation blend with an
/// exposure key, followed by a gamma curve.
fn reinhard(img: &mut HdrImage, gamma: f32, intensity: f32, light_adapt: f32, color_adapt: f32) {
    let pixels = (img.data.len() / 3).max(1) as f32;
    let mut mean_log = 0.0f32;
    let mut mean_chan = [0.0f32; 3];
    for px in img.data.chunks_exact(3) {
        mean_log += (luminance(px) + EPS).ln();
        for (m, c) in mean_chan.iter_mut().zip(px) {
            *m += c;
        }
    }
    let log_avg = (mean_log / pixels).exp();
    for m in &mut mean_chan {
        *m /= pixels;
    }
    let global_lum = luminance(&mean_chan);

    let f = (-intensity).exp2();
    // Contrast exponent from the scene key, as in the Reinhard-Devlin paper.
    let l_max = max_luminance(img);
    let key = (log_avg.ln() - EPS.ln()) / (l_max.ln() - EPS.ln() + EPS);
    let m = 0.3 + 0.7 * (1.0 - key).powf(1.4);

    for px in img.data.chunks_exact_mut(3) {
        let lw = luminance(px).max(EPS);
        for ch in 0..3 {
            let local = color_adapt * px[ch] + (1.0 - color_adapt) * lw;
            let global = color_adapt * mean_chan[ch] + (1.0 - color_adapt) * global_lum;
            let adapt = (light_adapt * local + (1.0 - light_adapt) * global).max(EPS);
            let mapped = px[ch] / (px[ch] + (f * adapt).powf(m));
            px[ch] = mapped.clamp(0.0, 1.0).powf(1.0 / gamma.max(EPS));
        }
    }
}

/// Log-domain contrast scaling in the spirit of Mantiuk 2006, with a bias
/// floor and channel resaturation against the compressed luminance.
fn mantiuk(img: &mut HdrImage, scale: f32, saturation: f32, bias: f32) {
    let l_max = max_luminance(img);
    let log_max = (l_max / EPS).ln();
    // Compress log contrast, keeping the bias fraction of the original range.
    let compress = scale + (1.0 - scale) * bias;
    let mut mapped_max = EPS;
    let mut lums = Vec::with_capacity(img.data.len() / 3);
    for px in img.data.chunks_exact(3) {
        let lw = luminance(px).max(EPS);
        let log_l = ((lw / EPS).ln() / log_max).clamp(0.0, 1.0);
        let ld = (EPS / l_max).powf(1.0 - log_l * compress);
        mapped_max = mapped_max.max(ld);
        lums.push((lw, ld));
    }
    for (px, &(lw, ld)) in img.data.chunks_exact_mut(3).zip(&lums) {
        let ld = ld / mapped_max;
        for c in px {
            let ratio = (*c / lw).max(0.0).powf(saturation);
            *c = (ld * ratio).clamp(0.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> HdrImage {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for i in 0..(w * h) {
            let v = (i as f32 + 1.0) / (w * h) as f32;
            data.extend_from_slice(&[v, v * 0.5, v * 0.25]);
        }
        HdrImage {
            width: w,
            height: h,
            data,
        }
    }

    #[test]
    fn unknown_operator_is_a_config_error() {
        let err = ToneMap::from_name("filmic").unwrap_err();
        assert!(matches!(err, FrameloomError::Config(_)));
    }

    #[test]
    fn unknown_preset_is_a_config_error() {
        assert!(ToneMap::preset("drago", "dramatic").is_err());
    }

    #[test]
    fn every_preset_resolves_for_every_operator() {
        for op in ["drago", "reinhard", "mantiuk"] {
            for preset in PRESET_NAMES {
                ToneMap::preset(op, preset).unwrap();
            }
        }
    }

    #[test]
    fn operators_keep_output_in_unit_range() {
        for op in [
            ToneMap::from_name("drago").unwrap(),
            ToneMap::from_name("reinhard").unwrap(),
            ToneMap::from_name("mantiuk").unwrap(),
        ] {
            let mut img = gradient(8, 8);
            op.apply(&mut img);
            assert!(
                img.data.iter().all(|v| (0.0..=1.0).contains(v)),
                "{op:?} left the unit range"
            );
        }
    }

    #[test]
    fn operators_are_deterministic() {
        for op in [
            ToneMap::from_name("drago").unwrap(),
            ToneMap::preset("reinhard", "cinematic").unwrap(),
            ToneMap::preset("mantiuk", "vivid").unwrap(),
        ] {
            let mut a = gradient(6, 4);
            let mut b = gradient(6, 4);
            op.apply(&mut a);
            op.apply(&mut b);
            assert_eq!(a.data, b.data);
        }
    }

    #[test]
    fn selection_round_trips_through_serde() {
        let op = ToneMap::preset("reinhard", "vivid").unwrap();
        let json = serde_json::to_string(&op).unwrap();
        let back: ToneMap = serde_json::from_str(&json).unwrap();
        assert_eq!(op, back);
    }
}
