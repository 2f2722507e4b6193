//! Vitrine application binary - composition root.
//!
//! Ties together all Vitrine crates into a single executable:
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Load the catalog CSV and build the flat vector index
//! 3. Assemble the search pipeline, report sink, and dialog engine
//! 4. Start the axum REST API server with the broadcast outbox

mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use vitrine_api::auth::load_or_generate_token;
use vitrine_api::{start_server, AppState, ChannelTransport};
use vitrine_core::config::VitrineConfig;
use vitrine_core::types::ChatId;
use vitrine_dialog::{ChatTransport, DialogEngine};
use vitrine_forms::{CsvReportSink, ReportSink};
use vitrine_search::{
    build_flat_index, CatalogStore, DynEmbeddingService, MockEmbedding, OnnxEmbedder,
    SearchPipeline, VectorIndex,
};

use cli::CliArgs;

/// Broadcast capacity for the outbound message channel.
const OUTBOX_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config before tracing so the log level can come from the file.
    let config_file = args.resolve_config_path();
    let mut config = VitrineConfig::load_or_default(&config_file);
    config.api.port = args.resolve_port(config.api.port);
    config.catalog.path = args
        .resolve_catalog_path(&config.catalog.path)
        .to_string_lossy()
        .to_string();

    // Tracing.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting Vitrine v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Catalog.
    let catalog_path = PathBuf::from(&config.catalog.path);
    let catalog = Arc::new(CatalogStore::load(&catalog_path)?);
    tracing::info!(
        path = %catalog_path.display(),
        items = catalog.len(),
        "Catalog loaded"
    );

    // Embedding backend.
    let use_mock = args.mock_embedder || config.embedding.backend == "mock";
    let embedder: Box<dyn DynEmbeddingService> = if use_mock {
        tracing::info!("Using deterministic mock embedder");
        Box::new(MockEmbedding::new())
    } else {
        let model_path = PathBuf::from(&config.embedding.model_path);
        let tokenizer_path = PathBuf::from(&config.embedding.tokenizer_path);
        let onnx = OnnxEmbedder::from_files(&model_path, &tokenizer_path)?;
        tracing::info!(model = %model_path.display(), "ONNX embedder loaded");
        Box::new(onnx)
    };

    // Flat index over the catalog, encoded once at startup.
    let index = build_flat_index(embedder.as_ref(), &catalog).await?;
    tracing::info!(rows = index.len(), "Vector index built");

    // Search pipeline.
    let pipeline = Arc::new(SearchPipeline::new_dyn(
        embedder,
        Arc::new(index) as Arc<dyn VectorIndex>,
        Arc::clone(&catalog),
        &config.search,
    ));

    // Report sink.
    let sink = Arc::new(CsvReportSink::new(&config.forms.reports_path));
    tracing::info!(path = %config.forms.reports_path, "Report sink ready");

    // Outbound transport over the broadcast outbox.
    let outbox = Arc::new(ChannelTransport::new(OUTBOX_CAPACITY));

    // Dialog engine.
    let notify_chat = config.forms.notify_chat.clone().map(ChatId);
    let engine = Arc::new(DialogEngine::new(
        pipeline,
        sink as Arc<dyn ReportSink>,
        Arc::clone(&outbox) as Arc<dyn ChatTransport>,
        notify_chat,
    ));
    let config_display = config_file.display().to_string();
    engine.announce_start(env!("CARGO_PKG_VERSION"), &config_display);

    // API token, stored next to the config file.
    let token_path = config_file
        .parent()
        .map(|dir| dir.join("api_token"))
        .unwrap_or_else(|| PathBuf::from("api_token"));
    let api_token = load_or_generate_token(&token_path);

    let state = AppState::new(config.clone(), engine, outbox, api_token);

    if let Err(e) = start_server(&config, state).await {
        tracing::error!(error = %e, "API server failed to start");
        tracing::error!(
            "If the port is taken, try: VITRINE_PORT={} vitrine",
            config.api.port.saturating_add(1)
        );
        return Err(e.into());
    }

    Ok(())
}
