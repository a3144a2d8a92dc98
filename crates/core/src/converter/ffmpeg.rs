//! FFmpeg-based audio and video converters.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::error::ConverterError;
use super::traits::{output_file, single_input, ConversionContext, Converter};
use crate::config::SandboxConfig;
use crate::sandbox::{ProcessSandbox, SandboxCommand};
use crate::upload::UploadedAsset;

/// Which sandbox timeout applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Output format and codec selection for one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FfmpegProfile {
    pub output_extension: &'static str,
    pub codec_args: &'static [&'static str],
    pub media: MediaKind,
}

const MP3_ARGS: &[&str] = &["-acodec", "libmp3lame", "-ab", "192k"];
const H264_AAC_ARGS: &[&str] = &["-c:v", "libx264", "-c:a", "aac"];

impl FfmpegProfile {
    pub const MP3_TO_WAV: Self = Self {
        output_extension: "wav",
        codec_args: &[],
        media: MediaKind::Audio,
    };
    pub const TO_MP3: Self = Self {
        output_extension: "mp3",
        codec_args: MP3_ARGS,
        media: MediaKind::Audio,
    };
    /// Drops the video stream.
    pub const EXTRACT_MP3: Self = Self {
        output_extension: "mp3",
        codec_args: &["-vn", "-acodec", "libmp3lame", "-ab", "192k"],
        media: MediaKind::Video,
    };
    pub const TO_AVI: Self = Self {
        output_extension: "avi",
        codec_args: H264_AAC_ARGS,
        media: MediaKind::Video,
    };
    pub const TO_MP4: Self = Self {
        output_extension: "mp4",
        codec_args: H264_AAC_ARGS,
        media: MediaKind::Video,
    };
    pub const TO_WEBM: Self = Self {
        output_extension: "webm",
        codec_args: &["-c:v", "libvpx-vp9", "-c:a", "libopus"],
        media: MediaKind::Video,
    };
}

/// Runs one ffmpeg invocation per job through the process sandbox.
pub struct FfmpegConverter {
    ffmpeg_path: PathBuf,
    profile: FfmpegProfile,
    timeout: Duration,
    sandbox: Arc<ProcessSandbox>,
}

impl FfmpegConverter {
    pub fn new(config: &SandboxConfig, profile: FfmpegProfile, sandbox: Arc<ProcessSandbox>) -> Self {
        let timeout_secs = match profile.media {
            MediaKind::Audio => config.audio_timeout_secs,
            MediaKind::Video => config.video_timeout_secs,
        };
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            profile,
            timeout: Duration::from_secs(timeout_secs),
            sandbox,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds ffmpeg arguments for one input/output pair.
    fn build_args(&self, input_path: &Path, output_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
        ];
        args.extend(self.profile.codec_args.iter().map(|a| a.to_string()));
        args.extend(["-loglevel".to_string(), "error".to_string()]);
        args.push(output_path.to_string_lossy().to_string());
        args
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn convert(
        &self,
        inputs: &[UploadedAsset],
        ctx: &ConversionContext,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let output_path = output_file(&ctx.output_dir, &input.stem, self.profile.output_extension);

        let command = SandboxCommand::new(&self.ffmpeg_path, &ctx.work_dir, self.timeout)
            .args(self.build_args(&input.staged_path, &output_path));
        debug!(job_id = %ctx.job_id, output = %output_path.display(), "Running ffmpeg");

        let output = self.sandbox.run(command).await?.ensure_success()?;

        let size = tokio::fs::metadata(&output_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(ConverterError::empty_output("ffmpeg produced no output"));
        }

        info!(
            job_id = %ctx.job_id,
            duration_ms = output.duration.as_millis() as u64,
            output_bytes = size,
            "ffmpeg conversion complete"
        );
        Ok(vec![output_path])
    }

    async fn check_available(&self) -> Result<(), ConverterError> {
        let dir = std::env::temp_dir();
        self.sandbox
            .probe(&self.ffmpeg_path, "-version", &dir)
            .await
            .map_err(ConverterError::from)
    }
}
