pub mod exporter;
pub mod font_service;
pub mod image_source;
pub mod load_cache;
pub mod qr_injector;
pub mod scene_loader;
pub mod substitution;
pub mod thumbnail;

pub use exporter::{export_file_name, CertificateExporter};
pub use font_service::{FontMetrics, FontService};
pub use image_source::{Bitmap, DefaultImageSource, ImageSource, LocalFiles};
pub use load_cache::{Claim, LoadCache};
pub use qr_injector::QrInjector;
pub use scene_loader::SceneLoader;
pub use substitution::{
    extract_variables, missing_variables, substitute, try_substitute, validate_variables,
    SceneVariables, SubstitutionError, ValidationReport,
};
pub use thumbnail::{ThumbnailService, UploadOutcome, THUMBNAIL_MAX_WIDTH};
