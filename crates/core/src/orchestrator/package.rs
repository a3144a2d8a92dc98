//! Zip packaging for multi-output conversions.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::converter::run_blocking;
use crate::error::ConversionError;

/// Suffix appended to the original stem for archived outputs.
pub const ARCHIVE_SUFFIX: &str = "_all_pages.zip";

pub fn archive_name(stem: &str) -> String {
    format!("{stem}{ARCHIVE_SUFFIX}")
}

/// Write `files` into `{output_dir}/{stem}_all_pages.zip`, in the given order,
/// each under its bare file name.
pub async fn package_outputs(
    files: Vec<PathBuf>,
    output_dir: &Path,
    stem: &str,
) -> Result<PathBuf, ConversionError> {
    let archive = output_dir.join(archive_name(stem));
    let target = archive.clone();
    run_blocking(move || write_archive(&files, &target).map_err(Into::into))
        .await
        .map_err(|e| ConversionError::internal(format!("failed to package outputs: {e}")))?;
    Ok(archive)
}

fn write_archive(files: &[PathBuf], archive: &Path) -> Result<(), std::io::Error> {
    let mut zip = ZipWriter::new(BufWriter::new(File::create(archive)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("output has no file name: {}", path.display()),
                )
            })?;
        zip.start_file(name, options).map_err(std::io::Error::other)?;
        let mut reader = BufReader::new(File::open(path)?);
        std::io::copy(&mut reader, &mut zip)?;
    }

    zip.finish().map_err(std::io::Error::other)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_archive_keeps_page_order() {
        let dir = TempDir::new().unwrap();
        let mut files = Vec::new();
        for n in 1..=3 {
            let path = dir.path().join(format!("report_page_{n:03}.png"));
            std::fs::write(&path, format!("page {n}")).unwrap();
            files.push(path);
        }

        let archive = package_outputs(files, dir.path(), "report").await.unwrap();
        assert_eq!(archive, dir.path().join("report_all_pages.zip"));

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(zip.len(), 3);
        for n in 0..3 {
            let mut entry = zip.by_index(n).unwrap();
            assert_eq!(entry.name(), format!("report_page_{:03}.png", n + 1));
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            assert_eq!(body, format!("page {}", n + 1));
        }
    }

    #[tokio::test]
    async fn test_missing_output_is_internal_error() {
        let dir = TempDir::new().unwrap();
        let err = package_outputs(vec![dir.path().join("gone.png")], dir.path(), "x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InternalError);
    }
}
