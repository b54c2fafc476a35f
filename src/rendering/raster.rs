use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder};
use resvg::usvg::{self, Transform};
use std::sync::Arc;
use tiny_skia::Pixmap;

use crate::error::RenderError;
use crate::models::ImageFormat;

/// Upper bound for either side of a rendered page (600 dpi A4 is 7016)
const MAX_SIDE: u32 = 16_384;

/// Upper bound for the area of a rendered page or a decoded source image.
/// 600 dpi A4 is about 35 MP.
pub const MAX_PIXELS: u64 = 64_000_000;

/// Reject render sizes that are empty or too large to allocate
pub fn check_size(width: u32, height: u32) -> Result<(), RenderError> {
    if width == 0 || height == 0 || width > MAX_SIDE || height > MAX_SIDE {
        return Err(RenderError::InvalidDimensions { width, height });
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(RenderError::ImageTooLarge {
            width,
            height,
            max: MAX_PIXELS,
        });
    }
    Ok(())
}

/// Turns SVG documents into pixels and encoded images
pub struct Rasterizer {
    fontdb: Arc<fontdb::Database>,
}

impl Rasterizer {
    pub fn new(fontdb: Arc<fontdb::Database>) -> Self {
        Self { fontdb }
    }

    /// Parse and rasterize SVG onto a white `width`×`height` pixmap.
    ///
    /// The drawing is scaled uniformly to fit and centred, so a canvas
    /// whose aspect ratio differs from the target gets white margins.
    pub fn rasterize(&self, svg: &str, width: u32, height: u32) -> Result<Pixmap, RenderError> {
        check_size(width, height)?;

        let options = usvg::Options {
            fontdb: self.fontdb.clone(),
            ..Default::default()
        };
        let tree =
            usvg::Tree::from_str(svg, &options).map_err(|e| RenderError::SvgParse(e.to_string()))?;

        let svg_size = tree.size();
        let scale_x = width as f32 / svg_size.width();
        let scale_y = height as f32 / svg_size.height();
        let scale = scale_x.min(scale_y);

        let offset_x = (width as f32 - svg_size.width() * scale) / 2.0;
        let offset_y = (height as f32 - svg_size.height() * scale) / 2.0;

        let mut pixmap = Pixmap::new(width, height).ok_or(RenderError::PixmapAllocation)?;
        pixmap.fill(tiny_skia::Color::WHITE);

        let transform = Transform::from_scale(scale, scale).post_translate(offset_x, offset_y);
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        tracing::debug!(width, height, scale, "Rasterized SVG");
        Ok(pixmap)
    }
}

/// Straight-alpha RGBA bytes of a pixmap
pub fn rgba_bytes(pixmap: &Pixmap) -> Vec<u8> {
    pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect()
}

/// RGB bytes of a pixmap composited over white
pub fn rgb_bytes(pixmap: &Pixmap) -> Vec<u8> {
    pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            // Premultiplied, so adding the white share of the backdrop is enough
            let white = 255 - p.alpha();
            [
                p.red().saturating_add(white),
                p.green().saturating_add(white),
                p.blue().saturating_add(white),
            ]
        })
        .collect()
}

/// Encode a pixmap. `quality` only applies to JPEG: PNG and WebP are
/// always written lossless and ignore it.
pub fn encode(pixmap: &Pixmap, format: ImageFormat, quality: u8) -> Result<Vec<u8>, RenderError> {
    match format {
        ImageFormat::Png => encode_png(pixmap),
        ImageFormat::Jpeg => {
            let mut out = Vec::new();
            JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
                .write_image(
                    &rgb_bytes(pixmap),
                    pixmap.width(),
                    pixmap.height(),
                    ExtendedColorType::Rgb8,
                )
                .map_err(|e| RenderError::ImageEncode(e.to_string()))?;
            Ok(out)
        }
        ImageFormat::Webp => {
            let mut out = Vec::new();
            WebPEncoder::new_lossless(&mut out)
                .write_image(
                    &rgba_bytes(pixmap),
                    pixmap.width(),
                    pixmap.height(),
                    ExtendedColorType::Rgba8,
                )
                .map_err(|e| RenderError::ImageEncode(e.to_string()))?;
            Ok(out)
        }
    }
}

/// Re-compress a PNG with oxipng, keeping the input if that fails
pub fn optimize_png(png: Vec<u8>) -> Vec<u8> {
    oxipng::optimize_from_memory(
        &png,
        &oxipng::Options {
            strip: oxipng::StripChunks::Safe,
            ..Default::default()
        },
    )
    .unwrap_or(png)
}

fn encode_png(pixmap: &Pixmap) -> Result<Vec<u8>, RenderError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, pixmap.width(), pixmap.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| RenderError::PngEncode(e.to_string()))?;
        writer
            .write_image_data(&rgba_bytes(pixmap))
            .map_err(|e| RenderError::PngEncode(e.to_string()))?;
    }
    Ok(out)
}
