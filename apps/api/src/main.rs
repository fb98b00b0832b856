mod config;
mod db;
mod errors;
mod models;
mod providers;
mod routes;
mod state;
mod store;
mod tailoring;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::providers::dispatcher::HybridDispatcher;
use crate::providers::http::{AnthropicClient, OpenAiCompatibleClient};
use crate::providers::model_state::ModelStateManager;
use crate::providers::registry::ProviderRegistry;
use crate::providers::{ProviderClient, ProviderKind};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::PgCvRepository;
use crate::tailoring::pipeline::TailorPipeline;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tailor API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    let repo = Arc::new(PgCvRepository::new(db));

    // Initialize provider clients and the active model
    let clients = build_provider_clients(&config);
    let configured = clients.keys().copied().collect();
    let model_state = Arc::new(
        ModelStateManager::with_preferred(
            Arc::new(ProviderRegistry::default()),
            configured,
            &config.default_model,
        )
        .context("No usable model for the configured providers")?,
    );
    let active = model_state.get_active();
    info!(
        "Active model: {} ({}); providers: {:?}",
        active.model_id,
        active.provider,
        model_state.configured_providers()
    );

    let dispatcher = Arc::new(HybridDispatcher::new(
        model_state.clone(),
        clients,
        config.provider_timeout,
    ));
    let pipeline = Arc::new(TailorPipeline::new(dispatcher, config.fallback_enabled));

    // Build app state
    let state = AppState {
        repo,
        model_state,
        pipeline,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client's domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// One client per provider with credentials. The DeepSeek client serves all
/// three DeepSeek model families.
fn build_provider_clients(config: &Config) -> HashMap<ProviderKind, Arc<dyn ProviderClient>> {
    let mut clients: HashMap<ProviderKind, Arc<dyn ProviderClient>> = HashMap::new();

    if let Some(key) = &config.deepseek_api_key {
        let deepseek: Arc<dyn ProviderClient> = Arc::new(OpenAiCompatibleClient::new(
            "deepseek",
            config.deepseek_base_url.clone(),
            key.clone(),
        ));
        for kind in [
            ProviderKind::PrimaryChat,
            ProviderKind::Coder,
            ProviderKind::Reasoner,
        ] {
            clients.insert(kind, deepseek.clone());
        }
    }
    if let Some(key) = &config.openai_api_key {
        clients.insert(
            ProviderKind::FallbackProviderA,
            Arc::new(OpenAiCompatibleClient::new(
                "openai",
                config.openai_base_url.clone(),
                key.clone(),
            )),
        );
    }
    if let Some(key) = &config.anthropic_api_key {
        clients.insert(
            ProviderKind::FallbackProviderB,
            Arc::new(AnthropicClient::new(key.clone())),
        );
    }

    clients
}
