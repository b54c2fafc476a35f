use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::error::RenderError;
use crate::models::Orientation;

/// A4 in PDF points (portrait)
pub const A4_WIDTH_PT: f32 = 595.28;
pub const A4_HEIGHT_PT: f32 = 841.89;

/// One rasterized page, 8-bit RGB without alpha
#[derive(Debug, Clone)]
pub struct PageImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

pub fn a4_points(orientation: Orientation) -> (f32, f32) {
    match orientation {
        Orientation::Portrait => (A4_WIDTH_PT, A4_HEIGHT_PT),
        Orientation::Landscape => (A4_HEIGHT_PT, A4_WIDTH_PT),
    }
}

/// Build an A4 PDF with one full-bleed image per page, in order.
///
/// Images are embedded uncompressed so print-resolution pages keep every
/// pixel exactly as rasterized.
pub fn build_pdf(pages: &[PageImage], orientation: Orientation) -> Result<Vec<u8>, RenderError> {
    if pages.is_empty() {
        return Err(RenderError::Pdf("document has no pages".to_string()));
    }

    let (page_w, page_h) = a4_points(orientation);
    let mut doc = Document::with_version("1.5");
    let pages_id: ObjectId = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for page in pages {
        let expected = page.width as usize * page.height as usize * 3;
        if page.rgb.len() != expected {
            return Err(RenderError::Pdf(format!(
                "page buffer holds {} bytes, expected {expected}",
                page.rgb.len()
            )));
        }

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => page.width as i64,
                "Height" => page.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            page.rgb.clone(),
        ));

        let content = format!("q {page_w} 0 0 {page_h} 0 0 cm /Im0 Do Q");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), page_w.into(), page_h.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => image_id,
                },
            },
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;

    tracing::debug!(pages = pages.len(), bytes = out.len(), "Assembled PDF");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(width: u32, height: u32) -> PageImage {
        PageImage {
            width,
            height,
            rgb: vec![255; (width * height * 3) as usize],
        }
    }

    fn media_box(doc: &Document, page_id: ObjectId) -> Vec<f32> {
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        page.get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o.as_float().unwrap())
            .collect()
    }

    #[test]
    fn test_front_and_back_pages() {
        let bytes = build_pdf(&[page(4, 3), page(4, 3)], Orientation::Landscape).unwrap();
        assert!(bytes.starts_with(b"%PDF-"));

        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);

        let first = *pages.get(&1).unwrap();
        let mb = media_box(&doc, first);
        assert!(mb[2] > mb[3], "landscape page should be wider than tall");
    }

    #[test]
    fn test_portrait_media_box() {
        let bytes = build_pdf(&[page(3, 4)], Orientation::Portrait).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let first = *doc.get_pages().get(&1).unwrap();
        let mb = media_box(&doc, first);
        assert!((mb[2] - A4_WIDTH_PT).abs() < 0.01);
        assert!((mb[3] - A4_HEIGHT_PT).abs() < 0.01);
    }

    #[test]
    fn test_rejects_empty_and_mismatched() {
        assert!(build_pdf(&[], Orientation::Portrait).is_err());
        let bad = PageImage {
            width: 2,
            height: 2,
            rgb: vec![0; 5],
        };
        assert!(matches!(
            build_pdf(&[bad], Orientation::Portrait),
            Err(RenderError::Pdf(_))
        ));
    }
}
