//! Minimal PDF typesetter on top of lopdf.
//!
//! Supports flowing text in the standard Type1 fonts, grid tables and
//! full-page JPEG images. Text is encoded as WinAnsi so it round-trips through
//! `lopdf::Document::extract_text`.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};
use std::path::Path;

use crate::converter::ConverterError;

/// A4 portrait, in points.
pub const PAGE_WIDTH: f32 = 595.0;
pub const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;

const TABLE_FONT_SIZE: f32 = 9.0;
const TABLE_PADDING: f32 = 3.0;
const MIN_COLUMN_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfFont {
    Regular,
    Bold,
    Mono,
    MonoBold,
}

impl PdfFont {
    const ALL: [PdfFont; 4] = [PdfFont::Regular, PdfFont::Bold, PdfFont::Mono, PdfFont::MonoBold];

    fn resource_name(self) -> &'static str {
        match self {
            PdfFont::Regular => "F1",
            PdfFont::Bold => "F2",
            PdfFont::Mono => "F3",
            PdfFont::MonoBold => "F4",
        }
    }

    fn base_font(self) -> &'static str {
        match self {
            PdfFont::Regular => "Helvetica",
            PdfFont::Bold => "Helvetica-Bold",
            PdfFont::Mono => "Courier",
            PdfFont::MonoBold => "Courier-Bold",
        }
    }

    fn is_mono(self) -> bool {
        matches!(self, PdfFont::Mono | PdfFont::MonoBold)
    }

    /// Average glyph advance as a fraction of the font size.
    fn char_width(self) -> f32 {
        if self.is_mono() {
            0.6
        } else {
            0.55
        }
    }
}

struct ImageXObject {
    jpeg: Vec<u8>,
    width_px: u32,
    height_px: u32,
}

struct PendingPage {
    operations: Vec<Operation>,
    width: f32,
    height: f32,
    image: Option<ImageXObject>,
}

/// Accumulates pages in memory, then writes them with [`PdfWriter::save`].
pub struct PdfWriter {
    pages: Vec<PendingPage>,
    current: Option<Vec<Operation>>,
    cursor_y: f32,
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfWriter {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: None,
            cursor_y: PAGE_HEIGHT - MARGIN,
        }
    }

    /// Number of pages written so far, including the one in progress.
    pub fn page_count(&self) -> usize {
        self.pages.len() + usize::from(self.current.is_some())
    }

    /// Word-wrapped paragraph. Mono fonts wrap by character and keep spacing.
    pub fn paragraph(&mut self, text: &str, font: PdfFont, size: f32) {
        let max_chars = ((PAGE_WIDTH - 2.0 * MARGIN) / (size * font.char_width())).floor() as usize;
        for raw in text.lines() {
            for line in wrap_line(raw, max_chars.max(1), font.is_mono()) {
                self.line(&line, font, size);
            }
        }
    }

    pub fn heading(&mut self, text: &str, size: f32) {
        self.paragraph(text, PdfFont::Bold, size);
        self.space(size * 0.5);
    }

    /// Vertical gap.
    pub fn space(&mut self, height: f32) {
        if self.current.is_some() {
            self.cursor_y -= height;
        }
    }

    /// Force the next content onto a fresh page.
    pub fn page_break(&mut self) {
        self.flush_current();
    }

    fn line(&mut self, text: &str, font: PdfFont, size: f32) {
        let leading = size * 1.3;
        self.ensure_space(leading);
        self.cursor_y -= leading;
        let y = self.cursor_y;
        if !text.trim().is_empty() {
            self.ops().extend(text_ops(text, font, size, MARGIN, y));
        }
    }

    /// Grid table, one row per entry. Rows shorter than the widest are padded.
    pub fn table(&mut self, rows: &[Vec<String>], bold_header: bool) {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return;
        }

        let char_w = TABLE_FONT_SIZE * PdfFont::Mono.char_width();
        let mut widths = vec![1usize; columns];
        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
        let budget = ((PAGE_WIDTH - 2.0 * MARGIN - columns as f32 * 2.0 * TABLE_PADDING) / char_w)
            .floor()
            .max(0.0) as usize;
        while widths.iter().sum::<usize>() > budget {
            let (widest, width) = widths
                .iter()
                .copied()
                .enumerate()
                .max_by_key(|(_, w)| *w)
                .unwrap_or((0, 0));
            if width <= MIN_COLUMN_CHARS {
                break;
            }
            widths[widest] -= 1;
        }

        let row_height = TABLE_FONT_SIZE + 2.0 * TABLE_PADDING + 2.0;
        let empty = String::new();
        for (index, row) in rows.iter().enumerate() {
            self.ensure_space(row_height);
            let y = self.cursor_y - row_height;
            let font = if bold_header && index == 0 {
                PdfFont::MonoBold
            } else {
                PdfFont::Mono
            };

            let mut ops = vec![Operation::new("w", vec![0.5f32.into()])];
            let mut x = MARGIN;
            for (col, width) in widths.iter().enumerate() {
                let cell_w = *width as f32 * char_w + 2.0 * TABLE_PADDING;
                ops.push(Operation::new(
                    "re",
                    vec![x.into(), y.into(), cell_w.into(), row_height.into()],
                ));
                ops.push(Operation::new("S", vec![]));
                let cell = row.get(col).unwrap_or(&empty);
                let text: String = cell.chars().take(*width).collect();
                if !text.trim().is_empty() {
                    ops.extend(text_ops(
                        &text,
                        font,
                        TABLE_FONT_SIZE,
                        x + TABLE_PADDING,
                        y + TABLE_PADDING + 2.0,
                    ));
                }
                x += cell_w;
            }
            self.ops().extend(ops);
            self.cursor_y = y;
        }
        self.space(TABLE_FONT_SIZE);
    }

    /// A page sized to the image at the given resolution.
    pub fn image_page(&mut self, jpeg: Vec<u8>, width_px: u32, height_px: u32, dpi: f32) {
        self.flush_current();
        let width = width_px as f32 * 72.0 / dpi;
        let height = height_px as f32 * 72.0 / dpi;
        let operations = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]),
            Operation::new("Q", vec![]),
        ];
        self.pages.push(PendingPage {
            operations,
            width,
            height,
            image: Some(ImageXObject {
                jpeg,
                width_px,
                height_px,
            }),
        });
    }

    /// Write the document. Fails when nothing was added.
    pub fn save(mut self, path: &Path) -> Result<usize, ConverterError> {
        self.flush_current();
        if self.pages.is_empty() {
            return Err(ConverterError::empty_output("document has no content"));
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut fonts = Dictionary::new();
        for font in PdfFont::ALL {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_font(),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(font.resource_name(), font_id);
        }

        let page_count = self.pages.len();
        let mut kids: Vec<Object> = Vec::with_capacity(page_count);
        for page in self.pages {
            let mut resources = dictionary! { "Font" => fonts.clone() };
            if let Some(image) = page.image {
                let image_stream = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => image.width_px as i64,
                        "Height" => image.height_px as i64,
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => 8,
                        "Filter" => "DCTDecode",
                    },
                    image.jpeg,
                )
                .with_compression(false);
                let image_id = doc.add_object(image_stream);
                resources.set("XObject", dictionary! { "Im1" => image_id });
            }

            let content = Content {
                operations: page.operations,
            }
            .encode()
            .map_err(|e| ConverterError::conversion_failed(format!("failed to encode page: {e}"), None))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), page.width.into(), page.height.into()],
                "Contents" => content_id,
                "Resources" => resources,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();
        doc.save(path)
            .map_err(|e| ConverterError::conversion_failed(format!("failed to write PDF: {e}"), None))?;
        Ok(page_count)
    }

    fn ops(&mut self) -> &mut Vec<Operation> {
        self.current.get_or_insert_with(Vec::new)
    }

    fn ensure_space(&mut self, height: f32) {
        if self.current.is_some() && self.cursor_y - height >= MARGIN {
            return;
        }
        self.flush_current();
        self.current = Some(Vec::new());
        self.cursor_y = PAGE_HEIGHT - MARGIN;
    }

    fn flush_current(&mut self) {
        if let Some(operations) = self.current.take() {
            self.pages.push(PendingPage {
                operations,
                width: PAGE_WIDTH,
                height: PAGE_HEIGHT,
                image: None,
            });
        }
        self.cursor_y = PAGE_HEIGHT - MARGIN;
    }
}

fn text_ops(text: &str, font: PdfFont, size: f32, x: f32, y: f32) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(font.resource_name().as_bytes().to_vec()), size.into()],
        ),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new(
            "Tj",
            vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
    ]
}

/// Encode text for a WinAnsiEncoding font. Unmappable characters become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        let byte = match c {
            '\t' => {
                out.extend_from_slice(b"    ");
                continue;
            }
            c if (c as u32) < 0x20 => continue,
            c if (c as u32) < 0x7f => c as u8,
            c if (0xa0..=0xff).contains(&(c as u32)) => c as u32 as u8,
            '\u{20ac}' => 0x80,
            '\u{2026}' => 0x85,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            _ => b'?',
        };
        out.push(byte);
    }
    out
}

/// Split one line into pieces of at most `max` characters.
fn wrap_line(line: &str, max: usize, keep_spacing: bool) -> Vec<String> {
    let line = line.replace('\t', "    ");
    if line.chars().count() <= max {
        return vec![line.trim_end().to_string()];
    }

    if keep_spacing {
        let chars: Vec<char> = line.chars().collect();
        return chars.chunks(max).map(|c| c.iter().collect()).collect();
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        let mut word: &str = word;
        loop {
            let used = current.chars().count();
            let needed = word.chars().count() + usize::from(used > 0);
            if used + needed <= max {
                if used > 0 {
                    current.push(' ');
                }
                current.push_str(word);
                break;
            }
            if used > 0 {
                lines.push(std::mem::take(&mut current));
                continue;
            }
            // Longer than a whole line on its own.
            let split = word.char_indices().nth(max).map(|(i, _)| i).unwrap_or(word.len());
            lines.push(word[..split].to_string());
            word = &word[split..];
            if word.is_empty() {
                break;
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("abc"), b"abc");
        assert_eq!(encode_win_ansi("caf\u{e9}"), vec![b'c', b'a', b'f', 0xe9]);
        assert_eq!(encode_win_ansi("\u{2014}"), vec![0x97]);
        assert_eq!(encode_win_ansi("\u{4e2d}"), b"?");
        assert_eq!(encode_win_ansi("a\tb"), b"a    b");
    }

    #[test]
    fn test_wrap_words() {
        let lines = wrap_line("the quick brown fox jumps", 10, false);
        assert_eq!(lines, vec!["the quick", "brown fox", "jumps"]);
    }

    #[test]
    fn test_wrap_long_word() {
        let lines = wrap_line("abcdefghijklmnop", 5, false);
        assert_eq!(lines, vec!["abcde", "fghij", "klmno", "p"]);
    }

    #[test]
    fn test_wrap_mono_keeps_spacing() {
        let lines = wrap_line("a   b   c   d", 4, true);
        assert_eq!(lines, vec!["a   ", "b   ", "c   ", "d"]);
    }

    #[test]
    fn test_empty_document_fails() {
        let dir = TempDir::new().unwrap();
        let err = PdfWriter::new().save(&dir.path().join("x.pdf")).unwrap_err();
        assert!(matches!(err, ConverterError::EmptyOutput { .. }));
    }

    #[test]
    fn test_text_round_trips_through_extract() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.pdf");
        let mut writer = PdfWriter::new();
        writer.paragraph("Hello PDF\nSecond line", PdfFont::Regular, 11.0);
        assert_eq!(writer.save(&path).unwrap(), 1);

        let doc = Document::load(&path).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        let text = doc.extract_text(&[1]).unwrap();
        assert!(text.contains("Hello PDF"));
        assert!(text.contains("Second line"));
    }

    #[test]
    fn test_long_text_paginates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("long.pdf");
        let mut writer = PdfWriter::new();
        let text: String = (0..200).map(|i| format!("line {i}\n")).collect();
        writer.paragraph(&text, PdfFont::Mono, 10.0);
        let pages = writer.save(&path).unwrap();
        assert!(pages > 1);
        assert_eq!(Document::load(&path).unwrap().get_pages().len(), pages);
    }

    #[test]
    fn test_table_and_image_pages() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mixed.pdf");
        let mut writer = PdfWriter::new();
        writer.table(
            &[
                vec!["name".into(), "qty".into()],
                vec!["apples".into(), "3".into()],
            ],
            true,
        );
        writer.image_page(vec![0xff, 0xd8, 0xff, 0xd9], 200, 100, 100.0);
        assert_eq!(writer.save(&path).unwrap(), 2);

        let doc = Document::load(&path).unwrap();
        let text = doc.extract_text(&[1]).unwrap();
        assert!(text.contains("apples"));
    }
}
