use fast_qr::{QRBuilder, ECL};

use crate::error::RenderError;
use crate::services::image_source::Bitmap;

/// Logical side of a generated QR image before it is scaled into its slot
pub const QR_LOGICAL_SIZE: u32 = 200;

/// Light modules around the code
pub const QR_QUIET_ZONE: usize = 4;

/// Encode `data` as a black-on-white QR code PNG at error correction
/// level H. Modules are whole pixels and the image is at least
/// [`QR_LOGICAL_SIZE`] pixels wide.
pub fn qr_png(data: &str) -> Result<Bitmap, RenderError> {
    let qr = QRBuilder::new(data)
        .ecl(ECL::H)
        .build()
        .map_err(|e| RenderError::QrCode(format!("QR code generation failed: {e}")))?;

    let modules = qr.size + 2 * QR_QUIET_ZONE;
    let module_px = (QR_LOGICAL_SIZE as usize).div_ceil(modules).max(1);
    let side = modules * module_px;

    // 8-bit grayscale, white background
    let mut pixels = vec![255u8; side * side];
    for row in 0..qr.size {
        for col in 0..qr.size {
            if !qr[row][col].value() {
                continue;
            }
            let x0 = (col + QR_QUIET_ZONE) * module_px;
            let y0 = (row + QR_QUIET_ZONE) * module_px;
            for y in y0..y0 + module_px {
                pixels[y * side + x0..y * side + x0 + module_px].fill(0);
            }
        }
    }

    let mut data_out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut data_out, side as u32, side as u32);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| RenderError::PngEncode(e.to_string()))?;
        writer
            .write_image_data(&pixels)
            .map_err(|e| RenderError::PngEncode(e.to_string()))?;
    }

    Ok(Bitmap {
        mime: "image/png",
        data: data_out,
        width: side as u32,
        height: side as u32,
    })
}
