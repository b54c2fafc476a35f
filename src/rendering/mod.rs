pub mod pdf;
pub mod qr;
pub mod raster;
pub mod surface;
pub mod svg;
pub mod text_layout;

pub use pdf::{build_pdf, PageImage};
pub use qr::qr_png;
pub use raster::Rasterizer;
pub use surface::{Surface, SurfaceObject};
pub use svg::render_svg;
pub use text_layout::{layout_text, ApproximateMeasure, FontSpec, TextLayout, TextMeasure};
