use lopdf::Document;
use std::path::Path;
use tracing::warn;

use crate::converter::ConverterError;

pub(crate) fn load(path: &Path) -> Result<Document, ConverterError> {
    Document::load(path)
        .map_err(|e| ConverterError::invalid_input(format!("not a readable PDF: {e}")))
}

/// Text of every page, in page order.
///
/// A page whose text cannot be decoded yields an empty string. A document
/// without pages is an error.
pub fn page_texts(path: &Path) -> Result<Vec<String>, ConverterError> {
    let doc = load(path)?;
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(ConverterError::empty_output("PDF has no pages"));
    }

    Ok(pages
        .keys()
        .map(|&number| match doc.extract_text(&[number]) {
            Ok(text) => normalize(&text),
            Err(e) => {
                warn!(page = number, error = %e, "Could not extract page text");
                String::new()
            }
        })
        .collect())
}

/// Trim trailing whitespace on each line and at the end.
fn normalize(text: &str) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    lines.join("\n").trim().to_string()
}

/// Fail when no page carries any text.
pub fn require_text(pages: &[String]) -> Result<(), ConverterError> {
    if pages.iter().all(|p| p.trim().is_empty()) {
        return Err(ConverterError::empty_output("PDF contains no extractable text"));
    }
    Ok(())
}
