//! Text-centric document converters: DOCX, plain text, HTML and EPUB.

use docx_rs::{BreakType, Docx, DocumentChild, Paragraph, ParagraphChild, Run, RunChild};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::pdf::writer::{PdfFont, PdfWriter};
use super::pdf::{page_texts, require_text};
use super::traits::{output_file, single_input, LibraryConversion};
use super::ConverterError;
use crate::upload::UploadedAsset;

const BODY_FONT_SIZE: f32 = 11.0;
const MONO_FONT_SIZE: f32 = 10.0;
const PARAGRAPH_GAP: f32 = 6.0;

static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

/// Elements whose content is never rendered.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "head", "noscript", "template", "svg"];

/// Elements that start a new paragraph.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main",
    "nav", "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

fn read_input(path: &Path) -> Result<Vec<u8>, ConverterError> {
    Ok(std::fs::read(path)?)
}

fn typeset_paragraphs(paragraphs: &[String], out: &Path) -> Result<usize, ConverterError> {
    let mut writer = PdfWriter::new();
    for paragraph in paragraphs {
        writer.paragraph(paragraph, PdfFont::Regular, BODY_FONT_SIZE);
        writer.space(PARAGRAPH_GAP);
    }
    writer.save(out)
}

/// `pdf_to_docx`: one paragraph per non-empty line, a page break between pages.
pub struct PdfToDocx;

impl LibraryConversion for PdfToDocx {
    fn name(&self) -> &str {
        "docx-rs"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let pages = page_texts(&input.staged_path)?;
        require_text(&pages)?;

        let mut docx = Docx::new();
        for (index, page) in pages.iter().enumerate() {
            if index > 0 {
                docx = docx.add_paragraph(
                    Paragraph::new().add_run(Run::new().add_break(BreakType::Page)),
                );
            }
            for line in page.lines().map(str::trim).filter(|l| !l.is_empty()) {
                docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)));
            }
        }

        let out = output_file(output_dir, &input.stem, "docx");
        let file = std::fs::File::create(&out)?;
        docx.build()
            .pack(file)
            .map_err(|e| ConverterError::conversion_failed(format!("failed to write DOCX: {e}"), None))?;
        Ok(vec![out])
    }
}

/// Plain text of every paragraph in the document body.
pub fn docx_paragraphs(data: &[u8]) -> Result<Vec<String>, ConverterError> {
    let docx = docx_rs::read_docx(data)
        .map_err(|e| ConverterError::invalid_input(format!("not a readable DOCX: {e}")))?;

    let mut paragraphs = Vec::new();
    for child in docx.document.children {
        if let DocumentChild::Paragraph(p) = child {
            let mut text = String::new();
            for child in p.children {
                if let ParagraphChild::Run(run) = child {
                    for child in run.children {
                        match child {
                            RunChild::Text(t) => text.push_str(&t.text),
                            RunChild::Tab(_) => text.push('\t'),
                            _ => {}
                        }
                    }
                }
            }
            if !text.trim().is_empty() {
                paragraphs.push(text);
            }
        }
    }
    Ok(paragraphs)
}

/// `docx_to_pdf`: paragraph text only; styling and images are not carried over.
pub struct DocxToPdf;

impl LibraryConversion for DocxToPdf {
    fn name(&self) -> &str {
        "docx-rs"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let paragraphs = docx_paragraphs(&read_input(&input.staged_path)?)?;
        if paragraphs.is_empty() {
            return Err(ConverterError::empty_output("document has no text"));
        }

        let out = output_file(output_dir, &input.stem, "pdf");
        typeset_paragraphs(&paragraphs, &out)?;
        Ok(vec![out])
    }
}

/// `txt_to_pdf`: monospaced, line breaks and spacing preserved.
pub struct TxtToPdf;

impl LibraryConversion for TxtToPdf {
    fn name(&self) -> &str {
        "lopdf"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let data = read_input(&input.staged_path)?;
        let text = String::from_utf8_lossy(&data);
        if text.trim().is_empty() {
            return Err(ConverterError::invalid_input("text file is blank"));
        }

        let mut writer = PdfWriter::new();
        writer.paragraph(&text, PdfFont::Mono, MONO_FONT_SIZE);
        let out = output_file(output_dir, &input.stem, "pdf");
        writer.save(&out)?;
        Ok(vec![out])
    }
}

/// Visible text of an HTML document, one entry per block.
pub fn html_paragraphs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut raw = String::new();
    match document.select(&BODY).next() {
        Some(body) => collect_text(body, &mut raw),
        None => collect_text(document.root_element(), &mut raw),
    }

    raw.split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(&text.replace('\n', " "));
        } else if let Some(el) = ElementRef::wrap(child) {
            let name = el.value().name();
            if SKIPPED_ELEMENTS.contains(&name) {
                continue;
            }
            if name == "br" {
                out.push('\n');
                continue;
            }
            let block = BLOCK_ELEMENTS.contains(&name);
            if block {
                out.push('\n');
            }
            collect_text(el, out);
            if block {
                out.push('\n');
            }
        }
    }
}

/// `html_to_pdf`: visible body text; layout and CSS are ignored.
pub struct HtmlToPdf;

impl LibraryConversion for HtmlToPdf {
    fn name(&self) -> &str {
        "scraper"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let data = read_input(&input.staged_path)?;
        let paragraphs = html_paragraphs(&String::from_utf8_lossy(&data));
        if paragraphs.is_empty() {
            return Err(ConverterError::empty_output("page has no visible text"));
        }

        let out = output_file(output_dir, &input.stem, "pdf");
        typeset_paragraphs(&paragraphs, &out)?;
        Ok(vec![out])
    }
}

/// `epub_to_pdf`: text of every content document, in archive order.
///
/// Each content document may inflate to at most `max_entry_bytes`.
pub struct EpubToPdf {
    pub max_entry_bytes: u64,
}

impl EpubToPdf {
    pub fn new(max_entry_bytes: u64) -> Self {
        Self { max_entry_bytes }
    }
}

fn is_content_document(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".xhtml") || lower.ends_with(".html") || lower.ends_with(".htm")
}

/// Paragraphs of every content document inside an EPUB.
///
/// Entries larger than `max_entry_bytes` once decompressed are rejected
/// before they are read in full.
pub fn epub_paragraphs(path: &Path, max_entry_bytes: u64) -> Result<Vec<String>, ConverterError> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| ConverterError::invalid_input(format!("not a readable EPUB: {e}")))?;

    let mut paragraphs = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| ConverterError::invalid_input(format!("corrupt EPUB entry: {e}")))?;
        if entry.is_dir() || !is_content_document(entry.name()) {
            continue;
        }
        let name = entry.name().to_string();
        if entry.size() > max_entry_bytes {
            return Err(oversized_entry(&name, max_entry_bytes));
        }
        // The declared size comes from the archive and cannot be trusted.
        let mut bytes = Vec::new();
        (&mut entry)
            .take(max_entry_bytes.saturating_add(1))
            .read_to_end(&mut bytes)?;
        if bytes.len() as u64 > max_entry_bytes {
            return Err(oversized_entry(&name, max_entry_bytes));
        }
        let found = html_paragraphs(&String::from_utf8_lossy(&bytes));
        debug!(entry = %name, paragraphs = found.len(), "Read EPUB content document");
        paragraphs.extend(found);
    }
    Ok(paragraphs)
}

fn oversized_entry(name: &str, limit: u64) -> ConverterError {
    ConverterError::invalid_input(format!(
        "EPUB entry {name} expands beyond {limit} bytes"
    ))
}

impl LibraryConversion for EpubToPdf {
    fn name(&self) -> &str {
        "zip"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let paragraphs = epub_paragraphs(&input.staged_path, self.max_entry_bytes)?;
        if paragraphs.is_empty() {
            return Err(ConverterError::empty_output("book has no text"));
        }

        let out = output_file(output_dir, &input.stem, "pdf");
        typeset_paragraphs(&paragraphs, &out)?;
        Ok(vec![out])
    }
}
