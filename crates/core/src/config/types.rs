use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub pdf: PdfConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Upload staging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Root directory under which every job gets its own subdirectory.
    #[serde(default = "default_staging_root")]
    pub staging_root: PathBuf,
    /// Per-file size ceiling in bytes.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// Minimum number of files for a merge operation.
    #[serde(default = "default_min_merge_files")]
    pub min_merge_files: usize,
    /// Maximum number of files for a merge operation.
    #[serde(default = "default_max_merge_files")]
    pub max_merge_files: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            staging_root: default_staging_root(),
            max_file_bytes: default_max_file_bytes(),
            min_merge_files: default_min_merge_files(),
            max_merge_files: default_max_merge_files(),
        }
    }
}

impl UploadConfig {
    /// Upper bound for a whole multipart request body.
    pub fn max_request_bytes(&self) -> usize {
        let files = self.max_merge_files.max(1) as u64;
        (files * self.max_file_bytes + 1024 * 1024) as usize
    }
}

fn default_staging_root() -> PathBuf {
    std::env::temp_dir().join("convertino-staging")
}

fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_min_merge_files() -> usize {
    2
}

fn default_max_merge_files() -> usize {
    10
}

/// Retention of staged inputs and produced artifacts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Delay after packaging before an undelivered artifact is removed.
    #[serde(default = "default_retention_delay")]
    pub delay_secs: u64,
    /// Interval between age sweeps of the staging root.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Job directories older than this and not owned by a live job are swept.
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            delay_secs: default_retention_delay(),
            sweep_interval_secs: default_sweep_interval(),
            max_age_secs: default_max_age(),
        }
    }
}

impl RetentionConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

fn default_retention_delay() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_max_age() -> u64 {
    3600
}

/// External tool invocation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SandboxConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    /// Path to the LibreOffice launcher.
    #[serde(default = "default_libreoffice_path")]
    pub libreoffice_path: PathBuf,
    /// Wall-clock limit for audio transcodes.
    #[serde(default = "default_audio_timeout")]
    pub audio_timeout_secs: u64,
    /// Wall-clock limit for video transcodes.
    #[serde(default = "default_video_timeout")]
    pub video_timeout_secs: u64,
    /// Wall-clock limit for office document conversions.
    #[serde(default = "default_document_timeout")]
    pub document_timeout_secs: u64,
    /// Bytes of stderr kept for diagnostics (the tail is kept).
    #[serde(default = "default_max_stderr_bytes")]
    pub max_stderr_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            libreoffice_path: default_libreoffice_path(),
            audio_timeout_secs: default_audio_timeout(),
            video_timeout_secs: default_video_timeout(),
            document_timeout_secs: default_document_timeout(),
            max_stderr_bytes: default_max_stderr_bytes(),
        }
    }
}

impl SandboxConfig {
    /// The longest configured tool timeout.
    pub fn longest_timeout_secs(&self) -> u64 {
        self.audio_timeout_secs
            .max(self.video_timeout_secs)
            .max(self.document_timeout_secs)
    }
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_libreoffice_path() -> PathBuf {
    PathBuf::from("libreoffice")
}

fn default_audio_timeout() -> u64 {
    300
}

fn default_video_timeout() -> u64 {
    600
}

fn default_document_timeout() -> u64 {
    60
}

fn default_max_stderr_bytes() -> usize {
    16 * 1024
}

/// PDF and image rendering settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PdfConfig {
    /// Directory containing the pdfium shared library. System library when unset.
    #[serde(default)]
    pub pdfium_library_path: Option<PathBuf>,
    /// Scale factor applied when rasterising pages.
    #[serde(default = "default_render_scale")]
    pub render_scale: f32,
    /// JPEG quality used when embedding images into PDFs.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Resolution used to size image pages.
    #[serde(default = "default_image_dpi")]
    pub image_dpi: f32,
    /// Longest edge for images merged into a PDF.
    #[serde(default = "default_max_merge_image_edge")]
    pub max_merge_image_edge: u32,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            pdfium_library_path: None,
            render_scale: default_render_scale(),
            jpeg_quality: default_jpeg_quality(),
            image_dpi: default_image_dpi(),
            max_merge_image_edge: default_max_merge_image_edge(),
        }
    }
}

fn default_render_scale() -> f32 {
    2.0
}

fn default_jpeg_quality() -> u8 {
    90
}

fn default_image_dpi() -> f32 {
    100.0
}

fn default_max_merge_image_edge() -> u32 {
    2000
}
