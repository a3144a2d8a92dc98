//! PDF converters built on lopdf and pdfium.

mod merge;
mod render;
mod text;
pub mod writer;

use std::path::{Path, PathBuf};

use super::escape_markup;
use super::traits::{output_file, single_input, LibraryConversion};
use super::ConverterError;
use crate::upload::UploadedAsset;

pub use merge::{compress_document, merge_documents};
pub use render::{page_file_name, PdfToPng};
pub use text::{page_texts, require_text};

/// `pdf_to_txt`: page texts separated by a blank line.
pub struct PdfToText;

impl LibraryConversion for PdfToText {
    fn name(&self) -> &str {
        "lopdf"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let pages = page_texts(&input.staged_path)?;
        require_text(&pages)?;

        let out = output_file(output_dir, &input.stem, "txt");
        std::fs::write(&out, format!("{}\n", pages.join("\n\n")))?;
        Ok(vec![out])
    }
}

/// `pdf_to_html`: one section per page.
pub struct PdfToHtml;

impl LibraryConversion for PdfToHtml {
    fn name(&self) -> &str {
        "lopdf"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let pages = page_texts(&input.staged_path)?;
        require_text(&pages)?;

        let out = output_file(output_dir, &input.stem, "html");
        std::fs::write(&out, render_html(&input.stem, &pages))?;
        Ok(vec![out])
    }
}

fn render_html(title: &str, pages: &[String]) -> String {
    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n",
        escape_markup(title)
    );
    for (index, page) in pages.iter().enumerate() {
        html.push_str(&format!("<h2>Page {}</h2>\n", index + 1));
        for block in page.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
            let lines: Vec<String> = block.lines().map(|l| escape_markup(l.trim())).collect();
            html.push_str(&format!("<p>{}</p>\n", lines.join("<br>\n")));
        }
    }
    html.push_str("</body>\n</html>\n");
    html
}

/// `compress_pdf`: lossless structural compression.
pub struct CompressPdf;

impl LibraryConversion for CompressPdf {
    fn name(&self) -> &str {
        "lopdf"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let out = output_file(output_dir, &format!("{}_compressed", input.stem), "pdf");
        compress_document(&input.staged_path, &out)?;
        Ok(vec![out])
    }
}

/// `merge_pdfs`: pages of every input, in upload order.
pub struct MergePdfs;

impl LibraryConversion for MergePdfs {
    fn name(&self) -> &str {
        "lopdf"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let paths: Vec<PathBuf> = inputs.iter().map(|a| a.staged_path.clone()).collect();
        let out = output_file(output_dir, &format!("merged_{}_pdfs", inputs.len()), "pdf");
        merge_documents(&paths, &out)?;
        Ok(vec![out])
    }
}

#[cfg(test)]
mod tests {
    use super::writer::{PdfFont, PdfWriter};
    use super::*;
    use tempfile::TempDir;

    fn staged_pdf(dir: &Path, stem: &str, pages: &[&str]) -> UploadedAsset {
        let path = dir.join(format!("00_{stem}.pdf"));
        let mut writer = PdfWriter::new();
        for (i, text) in pages.iter().enumerate() {
            if i > 0 {
                writer.page_break();
            }
            writer.paragraph(text, PdfFont::Regular, 12.0);
        }
        writer.save(&path).unwrap();
        UploadedAsset {
            original_filename: format!("{stem}.pdf"),
            stem: stem.to_string(),
            extension: "pdf".to_string(),
            size_bytes: std::fs::metadata(&path).unwrap().len(),
            staged_path: path,
        }
    }

    #[test]
    fn test_pdf_to_text_joins_pages() {
        let dir = TempDir::new().unwrap();
        let input = staged_pdf(dir.path(), "notes", &["First page", "Second page"]);
        let outputs = PdfToText.convert_blocking(&[input], dir.path()).unwrap();

        assert_eq!(outputs, vec![dir.path().join("notes.txt")]);
        let text = std::fs::read_to_string(&outputs[0]).unwrap();
        assert_eq!(text, "First page\n\nSecond page\n");
    }

    #[test]
    fn test_pdf_to_text_rejects_textless_pdf() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blank.pdf");
        let mut writer = PdfWriter::new();
        writer.table(&[vec![" ".to_string()]], false);
        writer.save(&path).unwrap();
        let input = UploadedAsset {
            original_filename: "blank.pdf".into(),
            stem: "blank".into(),
            extension: "pdf".into(),
            staged_path: path,
            size_bytes: 1,
        };

        let err = PdfToText.convert_blocking(&[input], dir.path()).unwrap_err();
        assert!(matches!(err, ConverterError::EmptyOutput { .. }));
    }

    #[test]
    fn test_pdf_to_html_has_page_headings() {
        let dir = TempDir::new().unwrap();
        let input = staged_pdf(dir.path(), "doc", &["A < B", "C & D"]);
        let outputs = PdfToHtml.convert_blocking(&[input], dir.path()).unwrap();

        let html = std::fs::read_to_string(&outputs[0]).unwrap();
        assert!(html.contains("<h2>Page 1</h2>"));
        assert!(html.contains("<h2>Page 2</h2>"));
        assert!(html.contains("A &lt; B"));
        assert!(html.contains("C &amp; D"));
    }

    #[test]
    fn test_compress_names_output() {
        let dir = TempDir::new().unwrap();
        let input = staged_pdf(dir.path(), "big", &["content"]);
        let outputs = CompressPdf.convert_blocking(&[input], dir.path()).unwrap();
        assert_eq!(outputs, vec![dir.path().join("big_compressed.pdf")]);
        assert_eq!(page_texts(&outputs[0]).unwrap(), vec!["content"]);
    }

    #[test]
    fn test_merge_names_output_by_count() {
        let dir = TempDir::new().unwrap();
        let a = staged_pdf(dir.path(), "a", &["A"]);
        let b = staged_pdf(dir.path(), "b", &["B"]);
        let c = staged_pdf(dir.path(), "c", &["C"]);
        let outputs = MergePdfs.convert_blocking(&[a, b, c], dir.path()).unwrap();
        assert_eq!(outputs, vec![dir.path().join("merged_3_pdfs.pdf")]);
        assert_eq!(page_texts(&outputs[0]).unwrap(), vec!["A", "B", "C"]);
    }

    /// A well-formed document whose page tree has no kids.
    fn staged_empty_pdf(dir: &Path) -> UploadedAsset {
        use lopdf::{dictionary, Document, Object};

        let path = dir.join("00_empty.pdf");
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0,
        });
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        doc.save(&path).unwrap();
        UploadedAsset {
            original_filename: "empty.pdf".into(),
            stem: "empty".into(),
            extension: "pdf".into(),
            size_bytes: std::fs::metadata(&path).unwrap().len(),
            staged_path: path,
        }
    }

    #[test]
    fn test_zero_page_pdf_is_conversion_failed() {
        use crate::error::{ConversionError, ErrorKind};
        use crate::FailureReason;

        let dir = TempDir::new().unwrap();
        let converters: [(&str, &dyn LibraryConversion); 3] = [
            ("pdf_to_txt", &PdfToText),
            ("pdf_to_html", &PdfToHtml),
            ("compress_pdf", &CompressPdf),
        ];
        for (identifier, converter) in converters {
            let input = staged_empty_pdf(dir.path());
            let err = converter.convert_blocking(&[input], dir.path()).unwrap_err();
            assert!(
                matches!(err, ConverterError::EmptyOutput { .. }),
                "{identifier}: {err:?}"
            );

            let err = ConversionError::from(err);
            assert_eq!(err.kind(), ErrorKind::ConversionFailed, "{identifier}");
            assert_eq!(err.failure_reason(), Some(FailureReason::EmptyOutput));
        }
        assert!(!dir.path().join("empty.txt").exists());
        assert!(!dir.path().join("empty_compressed.pdf").exists());
    }
}
