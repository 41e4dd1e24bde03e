use std::{
    io::Write as _,
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{FrameloomError, FrameloomResult},
    loader::FrameRgb,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    #[default]
    H264,
    Mpeg4,
}

impl Codec {
    fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::Mpeg4 => "mpeg4",
        }
    }

    pub fn from_name(name: &str) -> FrameloomResult<Self> {
        match name {
            "h264" => Ok(Self::H264),
            "mpeg4" => Ok(Self::Mpeg4),
            other => Err(FrameloomError::config(format!(
                "unknown codec '{other}' (expected h264 or mpeg4)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    #[default]
    Mp4,
    Mkv,
    Avi,
}

impl Container {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
            Self::Avi => "avi",
        }
    }

    pub fn from_name(name: &str) -> FrameloomResult<Self> {
        match name {
            "mp4" => Ok(Self::Mp4),
            "mkv" => Ok(Self::Mkv),
            "avi" => Ok(Self::Avi),
            other => Err(FrameloomError::config(format!(
                "unknown container format '{other}' (expected mp4, mkv or avi)"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: Codec,
    pub container: Container,
    pub out_path: PathBuf,
    pub overwrite: bool,
}

impl EncodeConfig {
    pub fn validate(&self) -> FrameloomResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameloomError::config(
                "encode width/height must be non-zero",
            ));
        }
        if self.fps == 0 {
            return Err(FrameloomError::config("encode fps must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            // Default settings target yuv420p output for maximum compatibility.
            return Err(FrameloomError::config(
                "encode width/height must be even (required for yuv420p output)",
            ));
        }
        Ok(())
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn ensure_parent_dir(path: &Path) -> FrameloomResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Video writer over a system `ffmpeg` child process fed rgb24 rawvideo on
/// stdin. The system binary is used rather than an FFI binding to avoid
/// native FFmpeg dev header/lib requirements.
///
/// Owns the output file exclusively; every frame must match the declared
/// resolution. [`FfmpegWriter::finish`] is idempotent, and dropping an
/// unfinished writer tears the child down best-effort.
pub struct FfmpegWriter {
    cfg: EncodeConfig,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    frames_written: u64,
}

impl FfmpegWriter {
    pub fn new(cfg: EncodeConfig) -> FrameloomResult<Self> {
        cfg.validate()?;
        ensure_parent_dir(&cfg.out_path)?;

        if !cfg.overwrite && cfg.out_path.exists() {
            return Err(FrameloomError::config(format!(
                "output file '{}' already exists",
                cfg.out_path.display()
            )));
        }

        if !is_ffmpeg_on_path() {
            return Err(FrameloomError::encode(
                "ffmpeg is required for video encoding, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        cmd.arg(if cfg.overwrite { "-y" } else { "-n" });
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            cfg.codec.ffmpeg_name(),
            "-pix_fmt",
            "yuv420p",
        ]);
        if cfg.container == Container::Mp4 {
            cmd.args(["-movflags", "+faststart"]);
        }
        cmd.arg(&cfg.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            FrameloomError::encode(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FrameloomError::encode("failed to open ffmpeg stdin (unexpected)"))?;

        Ok(Self {
            cfg,
            child: Some(child),
            stdin: Some(stdin),
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn write_frame(&mut self, frame: &FrameRgb) -> FrameloomResult<()> {
        if frame.width != self.cfg.width || frame.height != self.cfg.height {
            return Err(FrameloomError::encode(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.cfg.width, self.cfg.height
            )));
        }
        if frame.data.len() != (self.cfg.width * self.cfg.height * 3) as usize {
            return Err(FrameloomError::encode(
                "frame data size mismatch with width*height*3",
            ));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(FrameloomError::encode("ffmpeg writer is already finished"));
        };

        stdin.write_all(&frame.data).map_err(|e| {
            FrameloomError::encode(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        self.frames_written += 1;
        Ok(())
    }

    /// Close stdin and wait for ffmpeg to finalize the container.
    ///
    /// Idempotent: a second call (e.g. retried cleanup during shutdown) is a
    /// no-op returning Ok.
    pub fn finish(&mut self) -> FrameloomResult<()> {
        drop(self.stdin.take());
        let Some(child) = self.child.take() else {
            return Ok(());
        };

        let output = child.wait_with_output().map_err(|e| {
            FrameloomError::encode(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FrameloomError::encode(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Drop for FfmpegWriter {
    // Abnormal exit: close the pipe and reap the child so no zombie is left.
    // The partial output file stays on disk.
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(width: u32, height: u32, fps: u32) -> EncodeConfig {
        EncodeConfig {
            width,
            height,
            fps,
            codec: Codec::H264,
            container: Container::Mp4,
            out_path: PathBuf::from("out/movie.mp4"),
            overwrite: true,
        }
    }

    #[test]
    fn config_validation_catches_bad_values() {
        assert!(cfg(0, 10, 30).validate().is_err());
        assert!(cfg(11, 10, 30).validate().is_err());
        assert!(cfg(10, 10, 0).validate().is_err());
        assert!(cfg(1920, 1080, 24).validate().is_ok());
    }

    #[test]
    fn codec_and_container_names_resolve() {
        assert_eq!(Codec::from_name("h264").unwrap(), Codec::H264);
        assert_eq!(Container::from_name("mkv").unwrap(), Container::Mkv);
        assert_eq!(Container::Avi.extension(), "avi");
        assert!(matches!(
            Codec::from_name("prores"),
            Err(FrameloomError::Config(_))
        ));
        assert!(matches!(
            Container::from_name("webm"),
            Err(FrameloomError::Config(_))
        ));
    }
}
