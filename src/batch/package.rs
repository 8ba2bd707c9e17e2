//! Packaging captured cards for download.
//!
//! ZIP archives hold one PNG per card. PDFs hold one full-bleed page per
//! card, sized to the template's physical dimensions at 96 CSS px per inch.

use std::collections::HashMap;
use std::io::{Cursor, Write};

use clap::ValueEnum;
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use printpdf::{
    ColorBits, ColorSpace, Image, ImageTransform, ImageXObject, Mm, PdfDocument, Px,
};
use serde::{Deserialize, Serialize};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::CardError;
use crate::record::{Record, RecordKind, underscore_whitespace};
use crate::render::raster::{Raster, encode_png};

/// Millimetres per CSS pixel.
pub const MM_PER_PX: f32 = 0.264583;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Zip,
    Pdf,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Zip => "zip",
            OutputFormat::Pdf => "pdf",
        }
    }
}

/// Single-card exports use PNG or a one-page PDF.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardFormat {
    #[default]
    Png,
    Pdf,
}

/// A finished download.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub fn archive_name(kind: RecordKind, format: OutputFormat) -> String {
    format!("Generated_{}_IDs.{}", kind, format.extension())
}

/// Package a batch. `card_size` is the template size in CSS pixels.
pub fn package(
    format: OutputFormat,
    kind: RecordKind,
    card_size: (u32, u32),
    rasters: &[Raster],
) -> Result<Artifact, CardError> {
    if rasters.is_empty() {
        return Err(CardError::Packaging("no cards were captured".into()));
    }
    let file_name = archive_name(kind, format);
    let (content_type, bytes) = match format {
        OutputFormat::Zip => ("application/zip", zip_pngs(rasters)?),
        OutputFormat::Pdf => {
            let pages: Vec<&RgbaImage> = rasters.iter().map(|r| &r.image).collect();
            ("application/pdf", pdf_pages(&file_name, card_size, &pages)?)
        }
    };
    tracing::info!(file = %file_name, cards = rasters.len(), bytes = bytes.len(), "Packaged batch");
    Ok(Artifact {
        file_name,
        content_type,
        bytes,
    })
}

/// Export one card as `<Name>_<regNo>` (students) or `<Name>` (events).
pub fn single_card(
    format: CardFormat,
    record: &Record,
    card_size: (u32, u32),
    image: &RgbaImage,
) -> Result<Artifact, CardError> {
    let stem = record.export_stem();
    match format {
        CardFormat::Png => Ok(Artifact {
            file_name: format!("{}.png", stem),
            content_type: "image/png",
            bytes: encode_png(image)?,
        }),
        CardFormat::Pdf => Ok(Artifact {
            file_name: format!("{}.pdf", stem),
            content_type: "application/pdf",
            bytes: pdf_pages(&stem, card_size, &[image])?,
        }),
    }
}

/// Entry names are the card name with whitespace replaced by `_`. Repeated
/// names get `_2`, `_3`, ... so no card overwrites another.
pub fn entry_names(rasters: &[Raster]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    rasters
        .iter()
        .map(|r| {
            let stem = underscore_whitespace(&r.name);
            let count = seen.entry(stem.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                format!("{}.png", stem)
            } else {
                format!("{}_{}.png", stem, count)
            }
        })
        .collect()
}

fn zip_pngs(rasters: &[Raster]) -> Result<Vec<u8>, CardError> {
    let map_err = |e: zip::result::ZipError| CardError::Packaging(format!("ZIP write failed: {}", e));
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (raster, name) in rasters.iter().zip(entry_names(rasters)) {
        let png = raster.to_png()?;
        zip.start_file(name, options).map_err(map_err)?;
        zip.write_all(&png)?;
    }
    let cursor = zip.finish().map_err(map_err)?;
    Ok(cursor.into_inner())
}

/// PDF pages carry no alpha channel, so composite onto white.
fn flatten(image: &RgbaImage) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let Rgba([r, g, b, a]) = *pixel;
        let alpha = a as f32 / 255.0;
        let mix = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        out.put_pixel(x, y, Rgb([mix(r), mix(g), mix(b)]));
    }
    out
}

fn pdf_pages(title: &str, card_size: (u32, u32), pages: &[&RgbaImage]) -> Result<Vec<u8>, CardError> {
    let width_mm = card_size.0 as f32 * MM_PER_PX;
    let height_mm = card_size.1 as f32 * MM_PER_PX;
    let (doc, first_page, first_layer) =
        PdfDocument::new(title, Mm(width_mm), Mm(height_mm), "Card");

    for (i, page) in pages.iter().enumerate() {
        let layer = if i == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (p, l) = doc.add_page(Mm(width_mm), Mm(height_mm), "Card");
            doc.get_page(p).get_layer(l)
        };

        let rgb = flatten(page);
        let (width_px, height_px) = rgb.dimensions();
        let image = Image::from(ImageXObject {
            width: Px(width_px as usize),
            height: Px(height_px as usize),
            color_space: ColorSpace::Rgb,
            bits_per_component: ColorBits::Bit8,
            interpolate: true,
            image_data: rgb.into_raw(),
            image_filter: None,
            clipping_bbox: None,
            smask: None,
        });

        // DPI = pixels / (mm / 25.4), so the raster fills the page exactly.
        let dpi = width_px as f32 / (width_mm / 25.4);
        image.add_to_layer(
            layer,
            ImageTransform {
                translate_x: Some(Mm(0.0)),
                translate_y: Some(Mm(0.0)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
    }

    doc.save_to_bytes()
        .map_err(|e| CardError::Packaging(format!("PDF write failed: {}", e)))
}
