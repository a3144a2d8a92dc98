//! Converter module: the backend contract and every built-in backend.
//!
//! A [`Converter`] takes the staged inputs of one job and writes its
//! outputs into the job's output directory. Library backends implement the
//! synchronous [`LibraryConversion`] and are adapted with
//! [`BlockingConverter`]; tool backends run through the process sandbox.
//!
//! # Families
//!
//! - Documents: DOCX, plain text, HTML, EPUB, and office formats via LibreOffice
//! - PDF: text/HTML extraction, compression, merge, page rasterisation
//! - Spreadsheets: XLSX/XLS and CSV
//! - Images: re-encoding, image-to-PDF, image merge
//! - Audio/video: ffmpeg transcodes

mod document;
mod error;
mod ffmpeg;
mod libreoffice;
pub mod pdf;
mod raster;
mod spreadsheet;
mod traits;

pub use document::{
    docx_paragraphs, epub_paragraphs, html_paragraphs, DocxToPdf, EpubToPdf, HtmlToPdf, PdfToDocx,
    TxtToPdf,
};
pub use error::ConverterError;
pub use ffmpeg::{FfmpegConverter, FfmpegProfile, MediaKind};
pub use libreoffice::LibreOfficeConverter;
pub use pdf::{CompressPdf, MergePdfs, PdfToHtml, PdfToPng, PdfToText};
pub use raster::{
    decode as decode_image, flatten_onto_white, ImageTarget, ImageToPdf, ImageTranscode, MergeImages,
};
pub use spreadsheet::{read_workbook, write_xlsx, CsvToPdf, CsvToXlsx, XlsxToCsv, XlsxToPdf};
pub use traits::{
    output_file, run_blocking, single_input, BlockingConverter, ConversionContext, Converter,
    LibraryConversion,
};

pub(crate) use traits::{escape_markup, panic_message};
