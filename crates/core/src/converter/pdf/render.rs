//! Page rasterisation through pdfium.

use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::converter::traits::{single_input, LibraryConversion};
use crate::converter::ConverterError;
use crate::upload::UploadedAsset;

/// Renders every page to `{stem}_page_NNN.png`.
pub struct PdfToPng {
    library_dir: Option<PathBuf>,
    scale: f32,
}

impl PdfToPng {
    pub fn new(library_dir: Option<PathBuf>, scale: f32) -> Self {
        Self { library_dir, scale }
    }

    fn bind(&self) -> Result<Pdfium, ConverterError> {
        let bindings = match &self.library_dir {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ConverterError::unavailable(format!("pdfium library not loadable: {e}")))?;
        Ok(Pdfium::new(bindings))
    }
}

/// `{stem}_page_NNN.png`, pages numbered from 1.
pub fn page_file_name(stem: &str, page_number: usize) -> String {
    format!("{stem}_page_{page_number:03}.png")
}

impl LibraryConversion for PdfToPng {
    fn name(&self) -> &str {
        "pdfium"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(&input.staged_path, None)
            .map_err(|e| ConverterError::invalid_input(format!("not a readable PDF: {e}")))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(self.scale);
        let mut outputs = Vec::new();
        for (index, page) in document.pages().iter().enumerate() {
            let image = page
                .render_with_config(&config)
                .map_err(|e| {
                    ConverterError::conversion_failed(
                        format!("failed to render page {}: {e}", index + 1),
                        None,
                    )
                })?
                .as_image();
            let path = output_dir.join(page_file_name(&input.stem, index + 1));
            image
                .save_with_format(&path, image::ImageFormat::Png)
                .map_err(|e| {
                    ConverterError::conversion_failed(format!("failed to write PNG: {e}"), None)
                })?;
            debug!(page = index + 1, width = image.width(), height = image.height(), "Rendered page");
            outputs.push(path);
        }

        if outputs.is_empty() {
            return Err(ConverterError::empty_output("PDF has no pages"));
        }
        Ok(outputs)
    }

    fn check_blocking(&self) -> Result<(), ConverterError> {
        self.bind().map(|_| ())
    }
}
