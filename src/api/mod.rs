pub mod render;
pub mod thumbnails;
pub mod variables;

pub use render::{
    export_response, handle_render_batch, handle_render_document, handle_render_image,
    BatchResponse, RenderBatchRequest, RenderDocumentRequest, RenderImageRequest,
    __path_handle_render_batch, __path_handle_render_document, __path_handle_render_image,
};
pub use thumbnails::{handle_thumbnail, ThumbnailRequest, __path_handle_thumbnail};
pub use variables::{
    handle_variables, VariablesRequest, VariablesResponse, __path_handle_variables,
};
