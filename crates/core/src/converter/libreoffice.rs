//! Office documents to PDF through headless LibreOffice.

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

/// Runs `soffice --headless --convert-to pdf` with a job-private profile.
///
/// The user installation lives under the job's work directory and is
/// removed with it.
pub struct LibreOfficeConverter {
    program: PathBuf,
    timeout: Duration,
    sandbox: Arc<ProcessSandbox>,
}

impl LibreOfficeConverter {
    pub fn new(config: &SandboxConfig, sandbox: Arc<ProcessSandbox>) -> Self {
        Self {
            program: config.libreoffice_path.clone(),
            timeout: Duration::from_secs(config.document_timeout_secs),
            sandbox,
        }
    }

    fn build_args(&self, input: &Path, work_dir: &Path) -> Vec<String> {
        vec![
            format!(
                "-env:UserInstallation=file://{}",
                work_dir.join("lo-profile").to_string_lossy()
            ),
            "--headless".to_string(),
            "--norestore".to_string(),
            "--convert-to".to_string(),
            "pdf".to_string(),
            "--outdir".to_string(),
            work_dir.join("lo-out").to_string_lossy().to_string(),
            input.to_string_lossy().to_string(),
        ]
    }
}

/// LibreOffice names its output after the input file.
fn produced_path(work_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    work_dir.join("lo-out").join(format!("{stem}.pdf"))
}

#[async_trait]
impl Converter for LibreOfficeConverter {
    fn name(&self) -> &str {
        "libreoffice"
    }

    async fn convert(
        &self,
        inputs: &[UploadedAsset],
        ctx: &ConversionContext,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let command = SandboxCommand::new(&self.program, &ctx.work_dir, self.timeout)
            .args(self.build_args(&input.staged_path, &ctx.work_dir));
        debug!(job_id = %ctx.job_id, input = %input.staged_path.display(), "Running LibreOffice");

        let output = self.sandbox.run(command).await?.ensure_success()?;

        // LibreOffice exits 0 even when the import filter rejects the file.
        let produced = produced_path(&ctx.work_dir, &input.staged_path);
        match tokio::fs::metadata(&produced).await {
            Ok(meta) if meta.len() > 0 => {}
            _ => {
                let stderr = Some(output.stderr).filter(|s| !s.trim().is_empty());
                return Err(ConverterError::conversion_failed(
                    "LibreOffice did not produce a PDF",
                    stderr,
                ));
            }
        }

        let final_path = output_file(&ctx.output_dir, &input.stem, "pdf");
        tokio::fs::rename(&produced, &final_path).await?;
        info!(
            job_id = %ctx.job_id,
            duration_ms = output.duration.as_millis() as u64,
            "LibreOffice conversion complete"
        );
        Ok(vec![final_path])
    }

    async fn check_available(&self) -> Result<(), ConverterError> {
        let dir = std::env::temp_dir();
        self.sandbox
            .probe(&self.program, "--version", &dir)
            .await
            .map_err(ConverterError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter(program: &str) -> LibreOfficeConverter {
        let config = SandboxConfig {
            libreoffice_path: PathBuf::from(program),
            document_timeout_secs: 5,
            ..Default::default()
        };
        LibreOfficeConverter::new(&config, Arc::new(ProcessSandbox::new(4096)))
    }

    #[test]
    fn test_build_args_use_private_profile() {
        let args = converter("soffice")
            .build_args(Path::new("/staging/j/input/00_a.doc"), Path::new("/staging/j/work"));
        assert_eq!(args[0], "-env:UserInstallation=file:///staging/j/work/lo-profile");
        assert!(args.contains(&"--headless".to_string()));
        let outdir = args.iter().position(|a| a == "--outdir").unwrap();
        assert_eq!(args[outdir + 1], "/staging/j/work/lo-out");
        assert_eq!(args.last().unwrap(), "/staging/j/input/00_a.doc");
    }

    #[test]
    fn test_produced_path_follows_staged_name() {
        assert_eq!(
            produced_path(Path::new("/w"), Path::new("/in/03_abc.pptx")),
            PathBuf::from("/w/lo-out/03_abc.pdf")
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let err = converter("/nonexistent/libreoffice")
            .check_available()
            .await
            .unwrap_err();
        assert!(matches!(err, ConverterError::ToolNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_without_output_is_conversion_failed() {
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let input_path = dir.path().join("00_x.doc");
        std::fs::write(&input_path, b"not really a doc").unwrap();
        let input = UploadedAsset {
            original_filename: "x.doc".into(),
            stem: "x".into(),
            extension: "doc".into(),
            staged_path: input_path,
            size_bytes: 16,
        };
        let ctx = ConversionContext {
            job_id: "j".into(),
            output_dir: dir.path().join("output"),
            work_dir: dir.path().join("work"),
        };

        // `true` ignores its arguments and exits 0 without writing anything.
        let err = converter("true").convert(&[input], &ctx).await.unwrap_err();
        assert!(matches!(err, ConverterError::ConversionFailed { .. }));
    }
}
