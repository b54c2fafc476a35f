use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use certkit::api;
use certkit::models::{
    AppConfig, BatchItem, CertificateTemplate, DocumentExportOptions, ImageExportOptions,
    ImageFormat, OutputMode, PageSide, QualityTier, VariableMap,
};
use certkit::server;
use certkit::services::substitution::{extract_variables, parse_scene};

#[derive(Parser)]
#[command(name = "certkit")]
#[command(about = "Certificate rendering - fill templates, add QR codes, export images and PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Render one certificate to a file (.pdf, .png, .jpg or .webp)
    Render {
        /// Template JSON file (front, back, canvasWidth, canvasHeight, certificateId)
        #[arg(short, long)]
        template: PathBuf,

        /// Variable map file (JSON or base64)
        #[arg(short, long)]
        variables: Option<PathBuf>,

        /// Output file; the extension selects the format
        #[arg(short, long)]
        output: PathBuf,

        /// Certificate id encoded in the validation QR code
        #[arg(long)]
        certificate_id: Option<String>,

        /// Render the back side (images only)
        #[arg(long)]
        back: bool,

        /// Image scale over the native canvas size (1-4)
        #[arg(long, default_value_t = 1.0)]
        scale: f32,

        /// JPEG quality (1-100)
        #[arg(long)]
        quality: Option<u8>,

        /// PDF quality tier: low, medium, high, maximum
        #[arg(long, value_parser = parse_tier)]
        tier: Option<QualityTier>,
    },
    /// Render one PDF per item of a batch file into a directory
    Batch {
        /// Template JSON file
        #[arg(short, long)]
        template: PathBuf,

        /// JSON array of { variables, metadata: { certificateId, fileName } }
        #[arg(short, long)]
        items: PathBuf,

        /// Output directory
        #[arg(short, long)]
        out_dir: PathBuf,

        /// PDF quality tier: low, medium, high, maximum
        #[arg(long, value_parser = parse_tier)]
        tier: Option<QualityTier>,
    },
    /// List the variables a scene refers to
    Variables {
        /// Scene JSON file
        scene: PathBuf,
    },
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "certkit API",
        description = "Certificate templating, QR injection and image/PDF export",
        version = "0.1.0",
        license(name = "MIT")
    ),
    paths(
        api::handle_render_image,
        api::handle_render_document,
        api::handle_render_batch,
        api::handle_variables,
        api::handle_thumbnail,
    ),
    components(schemas(
        api::RenderImageRequest,
        api::RenderDocumentRequest,
        api::RenderBatchRequest,
        api::BatchResponse,
        api::VariablesRequest,
        api::VariablesResponse,
        api::ThumbnailRequest,
        certkit::models::ExportResult,
        certkit::models::ExportPayload,
        certkit::services::UploadOutcome,
    )),
    tags(
        (name = "Render", description = "Certificate image and PDF export"),
        (name = "Variables", description = "Scene variable inspection"),
        (name = "Thumbnails", description = "Thumbnail generation and upload")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Render {
            template,
            variables,
            output,
            certificate_id,
            back,
            scale,
            quality,
            tier,
        }) => {
            init_cli_logging();
            let side = if back { PageSide::Back } else { PageSide::Front };
            run_render_command(
                &template,
                variables.as_deref(),
                &output,
                certificate_id,
                side,
                scale,
                quality,
                tier,
            )
            .await
        }
        Some(Commands::Batch {
            template,
            items,
            out_dir,
            tier,
        }) => {
            init_cli_logging();
            run_batch_command(&template, &items, out_dir, tier).await
        }
        Some(Commands::Variables { scene }) => {
            init_cli_logging();
            run_variables_command(&scene)
        }
        Some(Commands::Serve) => run_server().await,
        None => {
            run_status_command();
            Ok(())
        }
    }
}

fn parse_tier(value: &str) -> Result<QualityTier, String> {
    serde_json::from_value(Value::String(value.to_ascii_lowercase()))
        .map_err(|_| format!("unknown tier '{value}' (low, medium, high, maximum)"))
}

/// Minimal logging for CLI commands
fn init_cli_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "certkit=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();
}

/// Configuration from CONFIG_FILE with FONTS_DIR, DOWNLOADS_DIR and
/// IMAGES_DIR overrides
fn load_config() -> AppConfig {
    let config_file = std::env::var("CONFIG_FILE").ok().map(PathBuf::from);
    let mut config = AppConfig::load(config_file.as_deref());

    if let Ok(dir) = std::env::var("FONTS_DIR") {
        config.fonts.dir = Some(PathBuf::from(dir));
    }
    if let Ok(dir) = std::env::var("DOWNLOADS_DIR") {
        config.export.downloads_dir = PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var("IMAGES_DIR") {
        config.images.base_dir = Some(PathBuf::from(dir));
    }
    config
}

fn read_template(path: &Path) -> anyhow::Result<CertificateTemplate> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid template {}", path.display()))
}

fn read_variables(path: Option<&Path>) -> anyhow::Result<VariableMap> {
    let Some(path) = path else {
        return Ok(VariableMap::new());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read variables {}", path.display()))?;
    Ok(VariableMap::decode(Value::String(content))?)
}

/// Render a certificate directly to a file (no server needed)
#[allow(clippy::too_many_arguments)]
async fn run_render_command(
    template: &Path,
    variables: Option<&Path>,
    output: &Path,
    certificate_id: Option<String>,
    side: PageSide,
    scale: f32,
    quality: Option<u8>,
    tier: Option<QualityTier>,
) -> anyhow::Result<()> {
    let mut template = read_template(template)?;
    if certificate_id.is_some() {
        template.certificate_id = certificate_id;
    }
    let variables = read_variables(variables)?;

    let state = server::create_cli_state(load_config())?;

    let is_pdf = output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

    let bytes = if is_pdf {
        let options = DocumentExportOptions {
            quality: tier,
            ..DocumentExportOptions::new(OutputMode::Blob)
        };
        state
            .exporter
            .document_bytes(&template, &variables, &options)
            .await?
    } else {
        let options = ImageExportOptions {
            format: ImageFormat::from_path(output),
            quality,
            scale,
            side,
            ..ImageExportOptions::new(OutputMode::Blob)
        };
        state
            .exporter
            .image_bytes(&template, &variables, &options)
            .await?
    };

    std::fs::write(output, &bytes)?;
    println!("Rendered {} ({} bytes)", output.display(), bytes.len());

    Ok(())
}

async fn run_batch_command(
    template: &Path,
    items: &Path,
    out_dir: PathBuf,
    tier: Option<QualityTier>,
) -> anyhow::Result<()> {
    let template = read_template(template)?;
    let content = std::fs::read_to_string(items)
        .with_context(|| format!("Failed to read batch {}", items.display()))?;
    let items: Vec<BatchItem> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid batch {}", items.display()))?;

    let mut config = load_config();
    config.export.downloads_dir = out_dir;
    let state = server::create_cli_state(config)?;

    let options = DocumentExportOptions {
        quality: tier,
        ..DocumentExportOptions::new(OutputMode::Download)
    };
    let results = state
        .exporter
        .render_document_batch(&template, &items, &options, |done, total| {
            println!("[{done}/{total}]");
        })
        .await;

    let mut failed = 0;
    for result in &results {
        match &result.error {
            None => println!("  ok     {}", result.file_name),
            Some(error) => {
                failed += 1;
                println!("  failed {}: {error}", result.file_name);
            }
        }
    }
    println!(
        "Rendered {} of {} certificates",
        results.len() - failed,
        results.len()
    );

    if failed > 0 {
        anyhow::bail!("{failed} certificate(s) failed");
    }
    Ok(())
}

fn run_variables_command(scene: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(scene)
        .with_context(|| format!("Failed to read scene {}", scene.display()))?;
    let document = parse_scene(content.as_str())?;
    let found = extract_variables(&document);

    println!("Text variables:");
    for key in &found.text {
        println!("  {{{{{key}}}}}");
    }
    println!("\nImage placeholders:");
    for name in &found.placeholders {
        println!("  {name}");
    }
    Ok(())
}

/// Show configuration and usage when no command is given
fn run_status_command() {
    let config_file = std::env::var("CONFIG_FILE").ok();
    let fonts_dir = std::env::var("FONTS_DIR").ok();
    let downloads_dir = std::env::var("DOWNLOADS_DIR").ok();
    let images_dir = std::env::var("IMAGES_DIR").ok();
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    println!("certkit v{}\n", env!("CARGO_PKG_VERSION"));
    println!("Configuration:");
    println!(
        "  CONFIG_FILE:   {}",
        config_file.as_deref().unwrap_or("(defaults)")
    );
    println!(
        "  FONTS_DIR:     {}",
        fonts_dir.as_deref().unwrap_or("(from config)")
    );
    println!(
        "  DOWNLOADS_DIR: {}",
        downloads_dir.as_deref().unwrap_or("(from config)")
    );
    println!(
        "  IMAGES_DIR:    {}",
        images_dir.as_deref().unwrap_or("(from config)")
    );
    println!("  BIND_ADDR:     {bind_addr}");
    println!("\nCommands:");
    println!("  certkit serve      Start the HTTP server");
    println!("  certkit render     Render one certificate to a file");
    println!("  certkit batch      Render a batch of PDFs");
    println!("  certkit variables  List the variables of a scene");
    println!("\nRun 'certkit --help' for more details.");
}

/// Run the HTTP server
async fn run_server() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "certkit=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let config = load_config();

    tracing::info!(
        downloads = %config.export.downloads_dir.display(),
        fonts = ?config.fonts.dir.as_ref().map(|p| p.display().to_string()),
        images = ?config.images.base_dir.as_ref().map(|p| p.display().to_string()),
        "Export settings"
    );

    let state = server::create_app_state(config)?;

    // Load fonts before the first request instead of during it
    let fonts = state.fonts.clone();
    tokio::spawn(async move {
        if let Err(e) = fonts.ensure_loaded().await {
            tracing::warn!(%e, "Font preload failed");
        }
    });

    let app = server::build_router(state)
        // OpenAPI documentation (production only)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "certkit server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
