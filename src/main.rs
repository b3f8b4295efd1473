//! Voya 服务入口
//!
//! 启动: cargo run
//! 加载配置 -> 组装 LLM / provider / 工作单元 / 监督者 -> 启动 axum 服务。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use voya::config::{load_config, AppConfig};
use voya::delegation::DelegationRegistry;
use voya::llm::{LlmClient, MockLlmClient, OpenAiClient};
use voya::providers::{
    AmadeusClient, HttpItineraryProvider, HttpProfileClient, NoopProfileClient, UserProfileClient,
};
use voya::server::{router, AppState, Auth0Verifier, DenyAllVerifier, IdentityVerifier};
use voya::state::create_checkpoint_store;
use voya::supervisor::{LlmDecisionEngine, Supervisor};
use voya::workers::{ActivityWorker, FlightWorker, ItineraryWorker, LodgingWorker};

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let has_key = std::env::var("OPENAI_API_KEY").is_ok();

    if provider == "openai" && has_key {
        tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider is mock, using Mock LLM");
        Arc::new(MockLlmClient)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let llm = create_llm_from_config(&cfg);

    let amadeus = Arc::new(AmadeusClient::new(
        cfg.providers.amadeus.api_key.as_deref().unwrap_or_default(),
        cfg.providers.amadeus.api_secret.as_deref().unwrap_or_default(),
        &cfg.providers.amadeus.token_url,
        &cfg.providers.amadeus.base_url,
        cfg.providers.amadeus.timeout_secs,
    ));

    let mut registry = DelegationRegistry::new(cfg.app.delegation_timeout_secs);
    registry.register(Arc::new(FlightWorker::new(llm.clone(), amadeus.clone())))?;
    registry.register(Arc::new(LodgingWorker::new(llm.clone(), amadeus.clone())))?;
    registry.register(Arc::new(ActivityWorker::new(llm.clone(), amadeus.clone())))?;
    match &cfg.providers.itinerary.base_url {
        Some(base_url) => {
            let itineraries = Arc::new(HttpItineraryProvider::new(
                base_url,
                cfg.providers.itinerary.timeout_secs,
            ));
            registry.register(Arc::new(ItineraryWorker::new(llm.clone(), itineraries)))?;
        }
        None => tracing::warn!("itinerary service not configured, capability disabled"),
    }

    let decision = Arc::new(LlmDecisionEngine::new(
        llm.clone(),
        &registry.capability_descriptions(),
    ));

    let store = create_checkpoint_store(cfg.storage.db_path.as_deref()).await;
    let supervisor = Arc::new(
        Supervisor::new(decision, Arc::new(registry), store).with_max_steps(cfg.app.max_steps),
    );

    let profile: Arc<dyn UserProfileClient> = match &cfg.providers.profile.base_url {
        Some(base_url) => Arc::new(HttpProfileClient::new(
            base_url,
            cfg.providers.profile.timeout_secs,
        )),
        None => Arc::new(NoopProfileClient),
    };

    let verifier: Arc<dyn IdentityVerifier> = match &cfg.auth.auth0_domain {
        Some(domain) => Arc::new(Auth0Verifier::new(domain)),
        None => {
            tracing::warn!("auth0 domain not configured, protected routes will reject");
            Arc::new(DenyAllVerifier)
        }
    };

    let state = Arc::new(AppState {
        supervisor,
        profile,
        verifier,
    });

    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Voya listening on {}", addr);

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown_signal.cancel();
        }
    });

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
