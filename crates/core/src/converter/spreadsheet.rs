//! Spreadsheet converters: XLSX/XLS and CSV.

use calamine::{open_workbook_auto, Data, Range, Reader};
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;

use super::pdf::writer::PdfWriter;
use super::escape_markup;
use super::traits::{output_file, single_input, LibraryConversion};
use super::ConverterError;
use crate::upload::UploadedAsset;

const HEADING_SIZE: f32 = 13.0;

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#{e}"),
    }
}

fn range_rows(range: &Range<Data>) -> Vec<Vec<String>> {
    range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect()
}

/// Every worksheet of a workbook as `(name, rows)`, in workbook order.
pub fn read_workbook(path: &Path) -> Result<Vec<(String, Vec<Vec<String>>)>, ConverterError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| ConverterError::invalid_input(format!("not a readable workbook: {e}")))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names().to_vec() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ConverterError::invalid_input(format!("unreadable sheet '{name}': {e}")))?;
        sheets.push((name, range_rows(&range)));
    }
    Ok(sheets)
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>, ConverterError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| ConverterError::invalid_input(format!("not a readable CSV: {e}")))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| ConverterError::invalid_input(format!("malformed CSV: {e}")))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn is_blank_row(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

/// `xlsx_to_csv`: first worksheet only.
pub struct XlsxToCsv;

impl LibraryConversion for XlsxToCsv {
    fn name(&self) -> &str {
        "calamine"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let sheets = read_workbook(&input.staged_path)?;
        let (_, rows) = sheets
            .into_iter()
            .next()
            .ok_or_else(|| ConverterError::empty_output("workbook has no sheets"))?;
        if rows.iter().all(|row| is_blank_row(row)) {
            return Err(ConverterError::empty_output("first sheet is empty"));
        }

        let out = output_file(output_dir, &input.stem, "csv");
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&out)
            .map_err(|e| ConverterError::conversion_failed(format!("failed to create CSV: {e}"), None))?;
        for row in &rows {
            writer
                .write_record(row)
                .map_err(|e| ConverterError::conversion_failed(format!("failed to write CSV: {e}"), None))?;
        }
        writer.flush()?;
        Ok(vec![out])
    }
}

/// `csv_to_xlsx`: a single sheet, every cell stored as a string.
pub struct CsvToXlsx;

impl LibraryConversion for CsvToXlsx {
    fn name(&self) -> &str {
        "zip"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let rows = read_csv(&input.staged_path)?;
        if rows.iter().all(|row| is_blank_row(row)) {
            return Err(ConverterError::empty_output("CSV has no data"));
        }

        let out = output_file(output_dir, &input.stem, "xlsx");
        write_xlsx(&out, "Sheet1", &rows)?;
        Ok(vec![out])
    }
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

/// Minimal single-sheet SpreadsheetML package with inline strings.
pub fn write_xlsx(path: &Path, sheet_name: &str, rows: &[Vec<String>]) -> Result<(), ConverterError> {
    let workbook = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        escape_markup(sheet_name)
    );

    let mut sheet = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        sheet.push_str(&format!("<row r=\"{}\">", r + 1));
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            sheet.push_str(&format!(
                "<c r=\"{}{}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                column_name(c),
                r + 1,
                escape_markup(value)
            ));
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let parts: [(&str, &str); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", &workbook),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/worksheets/sheet1.xml", &sheet),
    ];

    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, body) in parts {
        zip.start_file(name, options)
            .map_err(|e| ConverterError::conversion_failed(format!("failed to write XLSX: {e}"), None))?;
        zip.write_all(body.as_bytes())?;
    }
    zip.finish()
        .map_err(|e| ConverterError::conversion_failed(format!("failed to write XLSX: {e}"), None))?;
    Ok(())
}

/// Zero-based column index to spreadsheet letters: 0 → A, 26 → AA.
fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

/// `xlsx_to_pdf`: every sheet as a heading and a grid table.
pub struct XlsxToPdf;

impl LibraryConversion for XlsxToPdf {
    fn name(&self) -> &str {
        "calamine"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let sheets = read_workbook(&input.staged_path)?;

        let mut writer = PdfWriter::new();
        let mut any = false;
        for (name, rows) in sheets {
            let rows = pad_rows(rows.into_iter().filter(|row| !is_blank_row(row)).collect());
            if rows.is_empty() {
                continue;
            }
            writer.heading(&format!("Sheet: {name}"), HEADING_SIZE);
            writer.table(&rows, false);
            any = true;
        }
        if !any {
            return Err(ConverterError::empty_output("workbook has no data"));
        }

        let out = output_file(output_dir, &input.stem, "pdf");
        writer.save(&out)?;
        Ok(vec![out])
    }
}

/// `csv_to_pdf`: a grid table with the first row in bold.
pub struct CsvToPdf;

impl LibraryConversion for CsvToPdf {
    fn name(&self) -> &str {
        "csv"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let rows = pad_rows(
            read_csv(&input.staged_path)?
                .into_iter()
                .filter(|row| !is_blank_row(row))
                .collect(),
        );
        if rows.is_empty() {
            return Err(ConverterError::empty_output("CSV has no data"));
        }

        let mut writer = PdfWriter::new();
        writer.table(&rows, true);
        let out = output_file(output_dir, &input.stem, "pdf");
        writer.save(&out)?;
        Ok(vec![out])
    }
}

/// Pad every row to the width of the widest.
fn pad_rows(mut rows: Vec<Vec<String>>) -> Vec<Vec<String>> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut rows {
        row.resize(width, String::new());
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::pdf::page_texts;
    use tempfile::TempDir;

    fn staged(dir: &Path, stem: &str, ext: &str, data: &[u8]) -> UploadedAsset {
        let path = dir.join(format!("00_{stem}.{ext}"));
        std::fs::write(&path, data).unwrap();
        UploadedAsset {
            original_filename: format!("{stem}.{ext}"),
            stem: stem.to_string(),
            extension: ext.to_string(),
            staged_path: path,
            size_bytes: data.len() as u64,
        }
    }

    fn staged_xlsx(dir: &Path, stem: &str, rows: &[Vec<String>]) -> UploadedAsset {
        let path = dir.join(format!("00_{stem}.xlsx"));
        write_xlsx(&path, "Data", rows).unwrap();
        UploadedAsset {
            original_filename: format!("{stem}.xlsx"),
            stem: stem.to_string(),
            extension: "xlsx".to_string(),
            size_bytes: std::fs::metadata(&path).unwrap().len(),
            staged_path: path,
        }
    }

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_column_name() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(27), "AB");
        assert_eq!(column_name(701), "ZZ");
        assert_eq!(column_name(702), "AAA");
    }

    #[test]
    fn test_write_xlsx_escapes_markup_and_drops_control_chars() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("odd.xlsx");
        write_xlsx(
            &path,
            "R&D",
            &rows(&[&["<b>", "it's \"quoted\""], &["bell\u{7}", "a & b"]]),
        )
        .unwrap();

        let sheets = read_workbook(&path).unwrap();
        assert_eq!(sheets[0].0, "R&D");
        assert_eq!(
            sheets[0].1,
            rows(&[&["<b>", "it's \"quoted\""], &["bell", "a & b"]])
        );
    }

    #[test]
    fn test_csv_to_xlsx_reads_back_with_calamine() {
        let dir = TempDir::new().unwrap();
        let input = staged(dir.path(), "prices", "csv", b"item,price\napple,1.5\n\"a, b\",<2>\n");
        let outputs = CsvToXlsx.convert_blocking(&[input], dir.path()).unwrap();
        assert_eq!(outputs, vec![dir.path().join("prices.xlsx")]);

        let sheets = read_workbook(&outputs[0]).unwrap();
        assert_eq!(sheets.len(), 1);
        assert_eq!(
            sheets[0].1,
            rows(&[&["item", "price"], &["apple", "1.5"], &["a, b", "<2>"]])
        );
    }

    #[test]
    fn test_xlsx_to_csv_keeps_empty_cells() {
        let dir = TempDir::new().unwrap();
        let input = staged_xlsx(
            dir.path(),
            "book",
            &rows(&[&["a", "", "c"], &["1", "2", "3"]]),
        );
        let outputs = XlsxToCsv.convert_blocking(&[input], dir.path()).unwrap();
        assert_eq!(outputs, vec![dir.path().join("book.csv")]);
        assert_eq!(
            std::fs::read_to_string(&outputs[0]).unwrap(),
            "a,,c\n1,2,3\n"
        );
    }

    #[test]
    fn test_empty_csv_fails() {
        let dir = TempDir::new().unwrap();
        let input = staged(dir.path(), "empty", "csv", b"\n,,\n");
        let err = CsvToPdf.convert_blocking(&[input.clone()], dir.path()).unwrap_err();
        assert!(matches!(err, ConverterError::EmptyOutput { .. }));
        let err = CsvToXlsx.convert_blocking(&[input], dir.path()).unwrap_err();
        assert!(matches!(err, ConverterError::EmptyOutput { .. }));
    }

    #[test]
    fn test_csv_to_pdf_table() {
        let dir = TempDir::new().unwrap();
        let input = staged(dir.path(), "people", "csv", b"name,age\nAda,36\nAlan\n");
        let outputs = CsvToPdf.convert_blocking(&[input], dir.path()).unwrap();
        let text = page_texts(&outputs[0]).unwrap().join("\n");
        for word in ["name", "age", "Ada", "36", "Alan"] {
            assert!(text.contains(word), "missing {word}");
        }
    }

    #[test]
    fn test_xlsx_to_pdf_has_sheet_heading() {
        let dir = TempDir::new().unwrap();
        let input = staged_xlsx(dir.path(), "report", &rows(&[&["Region", "Sales"], &["North", "10"]]));
        let outputs = XlsxToPdf.convert_blocking(&[input], dir.path()).unwrap();
        let text = page_texts(&outputs[0]).unwrap().join("\n");
        assert!(text.contains("Sheet: Data"));
        assert!(text.contains("North"));
    }

    #[test]
    fn test_garbage_workbook_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let input = staged(dir.path(), "junk", "xlsx", b"PK but not really");
        let err = XlsxToCsv.convert_blocking(&[input], dir.path()).unwrap_err();
        assert!(matches!(err, ConverterError::InvalidInput { .. }));
    }

    #[test]
    fn test_pad_rows() {
        let padded = pad_rows(rows(&[&["a"], &["b", "c", "d"]]));
        assert_eq!(padded, rows(&[&["a", "", ""], &["b", "c", "d"]]));
    }
}
