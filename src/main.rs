//! cloud-pinyin - Remote pinyin lookups for an input method
//!
//! This is the composition root that wires together all the components.

use cloud_pinyin::adapters::inbound::Console;
use cloud_pinyin::adapters::outbound::{BaiduBackend, GoogleBackend, BAIDU_BASE_URL, GOOGLE_BASE_URL};
use cloud_pinyin::application::LookupService;
use cloud_pinyin::config::load_config;
use cloud_pinyin::infrastructure::{shutdown_signal, ShutdownController};
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging; stdout carries lookup results
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "starting cloud-pinyin backend={} min_key_length={} max_requests={}",
        cfg.backend.map(|b| b.as_str()).unwrap_or("none"),
        cfg.min_key_length,
        cfg.max_requests
    );

    // ===== COMPOSITION ROOT =====

    // 1. Create outbound adapters
    let google = GoogleBackend::new(cfg.google_url.as_deref().unwrap_or(GOOGLE_BASE_URL))?;
    let baidu = BaiduBackend::new(cfg.baidu_url.as_deref().unwrap_or(BAIDU_BASE_URL))?;

    // 2. Create application service (starts the fetch worker)
    let service = LookupService::start(cfg.lookup_options(), cfg.engine_config())?
        .with_backend(Arc::new(google))
        .with_backend(Arc::new(baidu));

    // 3. Wire shutdown signals
    let shutdown = ShutdownController::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    // 4. Create inbound adapter and run
    let console = Console::new(service, cfg.toggle_key, cfg.reset_key, shutdown);

    console.run().await
}
