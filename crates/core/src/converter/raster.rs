//! Raster image converters built on the `image` crate.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::pdf::writer::PdfWriter;
use super::traits::{output_file, single_input, LibraryConversion};
use super::ConverterError;
use crate::upload::UploadedAsset;

/// Quality for image-to-image JPEG output.
const TRANSCODE_JPEG_QUALITY: u8 = 95;

/// Target of an image-to-image conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTarget {
    Png,
    Jpeg,
    WebP,
}

impl ImageTarget {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageTarget::Png => "png",
            ImageTarget::Jpeg => "jpg",
            ImageTarget::WebP => "webp",
        }
    }
}

/// Decode by content, not by extension.
pub fn decode(path: &Path) -> Result<DynamicImage, ConverterError> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| ConverterError::invalid_input(format!("not a readable image: {e}")))
}

/// Composite onto a white background, dropping alpha.
pub fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

fn encode_jpeg(rgb: RgbImage, quality: u8) -> Result<Vec<u8>, ConverterError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(rgb)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        .map_err(|e| ConverterError::conversion_failed(format!("JPEG encoding failed: {e}"), None))?;
    Ok(buf)
}

fn write_image(img: &DynamicImage, target: ImageTarget, out: &Path) -> Result<(), ConverterError> {
    let result = match target {
        ImageTarget::Png => img.save_with_format(out, ImageFormat::Png),
        ImageTarget::Jpeg => {
            let jpeg = encode_jpeg(flatten_onto_white(img), TRANSCODE_JPEG_QUALITY)?;
            std::fs::write(out, jpeg)?;
            Ok(())
        }
        // The WebP encoder is lossless and accepts 8-bit RGB or RGBA only.
        ImageTarget::WebP => {
            let normalized = if img.color().has_alpha() {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            normalized.save_with_format(out, ImageFormat::WebP)
        }
    };
    result.map_err(|e| {
        ConverterError::conversion_failed(
            format!("failed to write {}: {e}", target.extension()),
            None,
        )
    })
}

/// Re-encode a single image into another raster format.
pub struct ImageTranscode {
    target: ImageTarget,
}

impl ImageTranscode {
    pub fn new(target: ImageTarget) -> Self {
        Self { target }
    }
}

impl LibraryConversion for ImageTranscode {
    fn name(&self) -> &str {
        "image"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let img = decode(&input.staged_path)?;
        let out = output_file(output_dir, &input.stem, self.target.extension());
        write_image(&img, self.target, &out)?;
        Ok(vec![out])
    }
}

/// Page geometry and encoding for image pages.
#[derive(Debug, Clone, Copy)]
pub struct ImagePageOptions {
    pub dpi: f32,
    pub jpeg_quality: u8,
    /// Longest edge in pixels; larger images are downscaled.
    pub max_edge: Option<u32>,
}

fn add_image_page(
    writer: &mut PdfWriter,
    path: &Path,
    options: ImagePageOptions,
) -> Result<(), ConverterError> {
    let mut img = decode(path)?;
    if let Some(max) = options.max_edge {
        if img.width() > max || img.height() > max {
            let (w, h) = (img.width(), img.height());
            img = img.thumbnail(max, max);
            debug!(from_w = w, from_h = h, to_w = img.width(), to_h = img.height(), "Downscaled image");
        }
    }
    let rgb = flatten_onto_white(&img);
    let (width, height) = rgb.dimensions();
    let jpeg = encode_jpeg(rgb, options.jpeg_quality)?;
    writer.image_page(jpeg, width, height, options.dpi);
    Ok(())
}

/// `image_to_pdf`: one page sized to the image.
pub struct ImageToPdf {
    options: ImagePageOptions,
}

impl ImageToPdf {
    pub fn new(dpi: f32, jpeg_quality: u8) -> Self {
        Self {
            options: ImagePageOptions {
                dpi,
                jpeg_quality,
                max_edge: None,
            },
        }
    }
}

impl LibraryConversion for ImageToPdf {
    fn name(&self) -> &str {
        "image"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let input = single_input(inputs)?;
        let mut writer = PdfWriter::new();
        add_image_page(&mut writer, &input.staged_path, self.options)?;
        let out = output_file(output_dir, &input.stem, "pdf");
        writer.save(&out)?;
        Ok(vec![out])
    }
}

/// `merge_images`: one page per image, in upload order.
pub struct MergeImages {
    options: ImagePageOptions,
}

impl MergeImages {
    pub fn new(dpi: f32, jpeg_quality: u8, max_edge: u32) -> Self {
        Self {
            options: ImagePageOptions {
                dpi,
                jpeg_quality,
                max_edge: Some(max_edge),
            },
        }
    }
}

impl LibraryConversion for MergeImages {
    fn name(&self) -> &str {
        "image"
    }

    fn convert_blocking(
        &self,
        inputs: &[UploadedAsset],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, ConverterError> {
        let mut writer = PdfWriter::new();
        for input in inputs {
            add_image_page(&mut writer, &input.staged_path, self.options).map_err(|e| match e {
                ConverterError::InvalidInput { reason } => ConverterError::InvalidInput {
                    reason: format!("{}: {reason}", input.original_filename),
                },
                other => other,
            })?;
        }
        let out = output_file(output_dir, &format!("merged_{}_images", inputs.len()), "pdf");
        writer.save(&out)?;
        Ok(vec![out])
    }
}

/// Encoded bytes of a solid test image.
#[cfg(test)]
pub(crate) fn sample_image(width: u32, height: u32, format: ImageFormat, alpha: bool) -> Vec<u8> {
    let img = if alpha {
        DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([200, 30, 30, 0]),
        ))
    } else {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 30, 30])))
    };
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}
