//! spacecam - browser-controlled camera appliance
//!
//! Main entry point.

use std::sync::Arc;

use spacecam::{
    auth::AuthService,
    device::FfmpegDevice,
    scheduler::TimelapseScheduler,
    session::CameraSession,
    state::{AppConfig, AppState},
    storage::MediaStore,
    web_api,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spacecam=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting spacecam v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        device = %config.device,
        photos_dir = %config.photos_dir.display(),
        videos_dir = %config.videos_dir.display(),
        "Configuration loaded"
    );

    // Probe the capture stack; a board without ffmpeg cannot serve anything
    let device = Arc::new(FfmpegDevice::probe(config.device.clone()).await?);
    tracing::info!(device = %config.device, "Capture device ready");

    let session = CameraSession::new(
        device,
        config.photos_dir.clone(),
        config.videos_dir.clone(),
    )
    .await?;
    tracing::info!("Camera session initialized (preview configuration active)");

    let scheduler = TimelapseScheduler::new(session.clone());
    let auth = Arc::new(AuthService::load(&config.credentials_path).await?);
    let store = Arc::new(MediaStore::new(
        config.photos_dir.clone(),
        config.videos_dir.clone(),
    ));
    tracing::info!("Scheduler, auth and media store initialized");

    // Create application state
    let state = AppState {
        config,
        session,
        scheduler,
        auth,
        store,
    };

    // Create router with static file serving
    let static_dir = state.config.static_dir.clone();
    let serve_dir = ServeDir::new(&static_dir)
        .not_found_service(ServeFile::new(format!("{static_dir}/index.html")));

    let app = web_api::create_router(state.clone())
        .fallback_service(serve_dir)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    tracing::info!(static_dir = %static_dir, "Static file serving enabled");

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
