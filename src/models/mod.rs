pub mod canvas;
pub mod config;
pub mod export;
pub mod scene;
pub mod variables;

pub use canvas::{
    CanvasDimensions, CertificateTemplate, Orientation, Page, PageSide, ProcessedCanvasData,
};
pub use config::{
    AppConfig, ExportConfig, FailurePolicy, FontConfig, FontSource, ImageConfig, ReflowConfig,
    UploadConfig,
};
pub use export::{
    sanitize_file_name, BatchItem, BatchMetadata, DocumentExportOptions, ExportPayload,
    ExportResult, ImageExportOptions, ImageFormat, OutputMode, QualityTier,
};
pub use scene::{
    Geometry, GroupNode, ImageNode, NodeMeta, Paint, PlaceholderNode, Point, QrPlaceholderNode,
    SceneDocument, SceneNode, ShapeKind, ShapeNode, TextNode, TextStyle, BACKGROUND_NAME,
};
pub use variables::{Variable, VariableError, VariableKind, VariableMap};
