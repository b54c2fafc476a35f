//! HTTP server setup and configuration.
//!
//! This module provides the router and application state used by both
//! the production server and integration tests.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::models::AppConfig;
use crate::services::{
    CertificateExporter, DefaultImageSource, FontService, ImageSource, LoadCache, LocalFiles,
    ThumbnailService,
};

/// Scene documents carry inline data URIs, so bodies can be large
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub fonts: Arc<FontService>,
    pub exporter: Arc<CertificateExporter>,
    pub thumbnails: Arc<ThumbnailService>,
}

/// Create application state for serving requests. Image nodes may use
/// data URIs and http(s) URLs, plus relative paths under
/// `images.base_dir` when one is configured.
pub fn create_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let client = http_client()?;
    let images = DefaultImageSource::from_config(client.clone(), &config.images);
    Ok(create_app_state_with(config, client, Arc::new(images)))
}

/// Create application state for local CLI runs, where image nodes may
/// also name any file the user can read.
pub fn create_cli_state(config: AppConfig) -> anyhow::Result<AppState> {
    let client = http_client()?;
    let images = DefaultImageSource::from_config(client.clone(), &config.images)
        .with_local_files(LocalFiles::Unrestricted);
    Ok(create_app_state_with(config, client, Arc::new(images)))
}

/// Create application state around a caller-provided image source
pub fn create_app_state_with(
    config: AppConfig,
    client: reqwest::Client,
    images: Arc<dyn ImageSource>,
) -> AppState {
    let config = Arc::new(config);

    let fonts = Arc::new(FontService::new(
        config.fonts.clone(),
        Arc::new(LoadCache::new("fonts")),
        client.clone(),
    ));
    let exporter = Arc::new(CertificateExporter::new(
        config.clone(),
        fonts.clone(),
        images,
    ));
    let thumbnails = Arc::new(ThumbnailService::new(
        exporter.clone(),
        config.upload.clone(),
        Arc::new(LoadCache::new("thumbnails")),
        client,
    ));

    AppState {
        config,
        fonts,
        exporter,
        thumbnails,
    }
}

pub fn http_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("certkit/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Build the API router with all endpoints and middleware.
///
/// This is the core router used by both production and tests.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/render/image", post(api::handle_render_image))
        .route("/api/render/document", post(api::handle_render_document))
        .route("/api/render/batch", post(api::handle_render_batch))
        .route("/api/variables", post(api::handle_variables))
        .route("/api/thumbnails", post(api::handle_thumbnail))
        // Health check
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}
