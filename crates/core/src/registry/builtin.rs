use std::sync::Arc;

use super::{Arity, ConversionSpec, FormatRegistry, OutputKind, RegistryError};
use crate::config::Config;
use crate::converter::{
    BlockingConverter, CompressPdf, CsvToPdf, CsvToXlsx, DocxToPdf, EpubToPdf, FfmpegConverter,
    FfmpegProfile, HtmlToPdf, ImageTarget, ImageToPdf, ImageTranscode, LibreOfficeConverter,
    MergeImages, MergePdfs, PdfToDocx, PdfToHtml, PdfToPng, PdfToText, TxtToPdf, XlsxToCsv,
    XlsxToPdf,
};
use crate::sandbox::ProcessSandbox;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp"];

/// Every conversion the service offers, wired to its backend.
pub fn builtin_registry(config: &Config) -> Result<FormatRegistry, RegistryError> {
    let mut registry = FormatRegistry::new();
    let sandbox = Arc::new(ProcessSandbox::new(config.sandbox.max_stderr_bytes));
    let merge = Arity::Merge {
        min: config.uploads.min_merge_files,
        max: config.uploads.max_merge_files,
    };
    let pdf = &config.pdf;

    // Documents
    registry.register(
        ConversionSpec::library("pdf_to_docx", &["pdf"]),
        BlockingConverter::shared(PdfToDocx),
    )?;
    registry.register(
        ConversionSpec::library("docx_to_pdf", &["docx"]),
        BlockingConverter::shared(DocxToPdf),
    )?;
    let office = Arc::new(LibreOfficeConverter::new(&config.sandbox, sandbox.clone()));
    registry.register(ConversionSpec::external("doc_to_pdf", &["doc"]), office.clone())?;
    registry.register(ConversionSpec::external("pptx_to_pdf", &["pptx"]), office)?;
    registry.register(
        ConversionSpec::library("pdf_to_txt", &["pdf"]),
        BlockingConverter::shared(PdfToText),
    )?;
    registry.register(
        ConversionSpec::library("txt_to_pdf", &["txt"]),
        BlockingConverter::shared(TxtToPdf),
    )?;
    registry.register(
        ConversionSpec::library("xlsx_to_csv", &["xlsx", "xls"]),
        BlockingConverter::shared(XlsxToCsv),
    )?;
    registry.register(
        ConversionSpec::library("csv_to_xlsx", &["csv"]),
        BlockingConverter::shared(CsvToXlsx),
    )?;
    registry.register(
        ConversionSpec::library("xlsx_to_pdf", &["xlsx", "xls"]),
        BlockingConverter::shared(XlsxToPdf),
    )?;
    registry.register(
        ConversionSpec::library("csv_to_pdf", &["csv"]),
        BlockingConverter::shared(CsvToPdf),
    )?;
    registry.register(
        ConversionSpec::library("html_to_pdf", &["html", "htm"]),
        BlockingConverter::shared(HtmlToPdf),
    )?;
    registry.register(
        ConversionSpec::library("epub_to_pdf", &["epub"]),
        BlockingConverter::shared(EpubToPdf::new(config.uploads.max_file_bytes)),
    )?;
    registry.register(
        ConversionSpec::library("pdf_to_html", &["pdf"]),
        BlockingConverter::shared(PdfToHtml),
    )?;

    // Images
    registry.register(
        ConversionSpec::library("jpg_to_png", &["jpg", "jpeg"]),
        BlockingConverter::shared(ImageTranscode::new(ImageTarget::Png)),
    )?;
    registry.register(
        ConversionSpec::library("png_to_jpg", &["png"]),
        BlockingConverter::shared(ImageTranscode::new(ImageTarget::Jpeg)),
    )?;
    registry.register(
        ConversionSpec::library("webp_to_jpg", &["webp"]),
        BlockingConverter::shared(ImageTranscode::new(ImageTarget::Jpeg)),
    )?;
    registry.register(
        ConversionSpec::library("jpg_to_webp", &["jpg", "jpeg"]),
        BlockingConverter::shared(ImageTranscode::new(ImageTarget::WebP)),
    )?;
    registry.register(
        ConversionSpec::library("image_to_pdf", IMAGE_EXTENSIONS),
        BlockingConverter::shared(ImageToPdf::new(pdf.image_dpi, pdf.jpeg_quality)),
    )?;
    registry.register(
        ConversionSpec::library("pdf_to_png", &["pdf"]).with_output_kind(OutputKind::ArchiveOfFiles),
        BlockingConverter::shared(PdfToPng::new(
            pdf.pdfium_library_path.clone(),
            pdf.render_scale,
        )),
    )?;
    registry.register(
        ConversionSpec::library("bmp_to_png", &["bmp"]),
        BlockingConverter::shared(ImageTranscode::new(ImageTarget::Png)),
    )?;

    // Audio and video
    let media: [(&str, &str, FfmpegProfile); 8] = [
        ("mp3_to_wav", "mp3", FfmpegProfile::MP3_TO_WAV),
        ("wav_to_mp3", "wav", FfmpegProfile::TO_MP3),
        ("mp4_to_mp3", "mp4", FfmpegProfile::EXTRACT_MP3),
        ("ogg_to_mp3", "ogg", FfmpegProfile::TO_MP3),
        ("mp4_to_avi", "mp4", FfmpegProfile::TO_AVI),
        ("avi_to_mp4", "avi", FfmpegProfile::TO_MP4),
        ("mkv_to_mp4", "mkv", FfmpegProfile::TO_MP4),
        ("mp4_to_webm", "mp4", FfmpegProfile::TO_WEBM),
    ];
    for (identifier, extension, profile) in media {
        registry.register(
            ConversionSpec::external(identifier, &[extension]),
            Arc::new(FfmpegConverter::new(&config.sandbox, profile, sandbox.clone())),
        )?;
    }

    // PDF tools and merges
    registry.register(
        ConversionSpec::library("compress_pdf", &["pdf"]),
        BlockingConverter::shared(CompressPdf),
    )?;
    registry.register(
        ConversionSpec::library("merge_pdfs", &["pdf"]).with_arity(merge),
        BlockingConverter::shared(MergePdfs),
    )?;
    registry.register(
        ConversionSpec::library("merge_images", IMAGE_EXTENSIONS).with_arity(merge),
        BlockingConverter::shared(MergeImages::new(
            pdf.image_dpi,
            pdf.jpeg_quality,
            pdf.max_merge_image_edge,
        )),
    )?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BackendKind;

    const IDENTIFIERS: [&str; 31] = [
        "pdf_to_docx", "docx_to_pdf", "doc_to_pdf", "pptx_to_pdf", "pdf_to_txt", "txt_to_pdf",
        "xlsx_to_csv", "csv_to_xlsx", "xlsx_to_pdf", "csv_to_pdf", "html_to_pdf", "epub_to_pdf",
        "pdf_to_html", "jpg_to_png", "png_to_jpg", "webp_to_jpg", "jpg_to_webp", "image_to_pdf",
        "pdf_to_png", "bmp_to_png", "mp3_to_wav", "wav_to_mp3", "mp4_to_mp3", "ogg_to_mp3",
        "mp4_to_avi", "avi_to_mp4", "mkv_to_mp4", "mp4_to_webm", "compress_pdf", "merge_pdfs",
        "merge_images",
    ];

    #[test]
    fn test_all_identifiers_registered() {
        let registry = builtin_registry(&Config::default()).unwrap();
        assert_eq!(registry.len(), IDENTIFIERS.len());
        for id in IDENTIFIERS {
            assert!(registry.contains(id), "missing {id}");
        }
    }

    #[test]
    fn test_merge_bounds_come_from_config() {
        let mut config = Config::default();
        config.uploads.min_merge_files = 3;
        config.uploads.max_merge_files = 5;
        let registry = builtin_registry(&config).unwrap();

        for id in ["merge_pdfs", "merge_images"] {
            let spec = registry.lookup(id).unwrap();
            assert_eq!(spec.arity, Arity::Merge { min: 3, max: 5 });
        }
        assert_eq!(registry.lookup("pdf_to_txt").unwrap().arity, Arity::Single);
    }

    #[test]
    fn test_backend_kinds() {
        let registry = builtin_registry(&Config::default()).unwrap();
        for id in ["doc_to_pdf", "pptx_to_pdf", "mp4_to_webm", "wav_to_mp3"] {
            assert_eq!(registry.lookup(id).unwrap().backend_kind, BackendKind::ExternalProcess);
        }
        for id in ["pdf_to_docx", "merge_pdfs", "jpg_to_webp"] {
            assert_eq!(registry.lookup(id).unwrap().backend_kind, BackendKind::Library);
        }
    }

    #[test]
    fn test_only_pdf_to_png_produces_an_archive() {
        let registry = builtin_registry(&Config::default()).unwrap();
        let archives: Vec<_> = registry
            .iter()
            .filter(|e| e.spec.output_kind == OutputKind::ArchiveOfFiles)
            .map(|e| e.spec.identifier.clone())
            .collect();
        assert_eq!(archives, vec!["pdf_to_png"]);
    }

    #[test]
    fn test_extensions() {
        let registry = builtin_registry(&Config::default()).unwrap();
        assert!(registry.lookup("jpg_to_png").unwrap().accepts("jpeg"));
        assert!(registry.lookup("xlsx_to_csv").unwrap().accepts("xls"));
        assert!(registry.lookup("html_to_pdf").unwrap().accepts("htm"));
        assert!(!registry.lookup("png_to_jpg").unwrap().accepts("jpg"));
        assert!(registry.lookup("merge_images").unwrap().accepts("webp"));
    }
}
