mod api;
mod config;
mod error;
mod filename;
mod links;
mod scratch;
mod service;
#[cfg(test)]
mod testing;
mod ytdlp;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{AppState, build_cors_layer, build_router},
    config::AppConfig,
    scratch::ScratchSpace,
    service::AudioDownloader,
    ytdlp::YtDlp,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(error) = run().await {
        eprintln!("Server error: {error:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ytune=info,tower_http=info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|value| value.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    if config.allowed_origins.is_empty() {
        warn!("ALLOWED_ORIGINS is not set. Falling back to development origins.");
    }
    if config.tool.ffmpeg_location.is_none() {
        info!("FFMPEG_PATH not set; yt-dlp will look up ffmpeg on PATH.");
    }

    let scratch = ScratchSpace::new(config.scratch_root.clone());
    scratch.sweep_stale(config.stale_scratch_age).await;
    info!("Scratch directories live under {:?}", scratch.root());

    let tool = YtDlp::new(config.tool.clone());
    let downloader = AudioDownloader::new(Arc::new(tool), scratch);
    let state = AppState {
        downloader: Arc::new(downloader),
        api_version: Arc::from(config.api_version.as_str()),
    };

    let cors = build_cors_layer(&config.cors_origins()).context("invalid CORS configuration")?;
    let app = build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("could not bind {}", config.bind_addr))?;

    info!(
        "Server ready on http://{} (API {}, {} output via {})",
        config.bind_addr, config.api_version, config.tool.audio_format, config.tool.binary
    );

    axum::serve(listener, app).await.context("HTTP server error")
}
