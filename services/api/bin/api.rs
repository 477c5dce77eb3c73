//! Main Entrypoint for the Anchor API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the capability adapters (recognizer, responder, synthesizer).
//! 3. Constructing the session store and pipeline broker.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anchor_api::{
    broker::Broker,
    config::Config,
    router::create_router,
    sessions::SessionStore,
    state::AppState,
};
use anchor_core::{
    recognizer::{HttpRecognizer, Recognizer},
    responder::{OpenAiResponder, Responder},
    synthesizer::{HttpSynthesizer, Synthesizer},
};
use anyhow::Context;
use async_openai::config::OpenAIConfig;
use std::{fs, net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Capability Adapters ---
    let system_prompt = match &config.system_prompt_path {
        Some(path) => {
            let prompt = fs::read_to_string(path)
                .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
            Some(prompt.trim().to_string())
        }
        None => None,
    };

    let openai_config = OpenAIConfig::new()
        .with_api_key(&config.openai_api_key)
        .with_api_base(&config.openai_api_base);
    let recognizer: Arc<dyn Recognizer> = Arc::new(HttpRecognizer::new(config.stt_api_url.clone()));
    let responder: Arc<dyn Responder> =
        Arc::new(OpenAiResponder::new(openai_config, config.chat_model.clone()));
    let synthesizer: Arc<dyn Synthesizer> = Arc::new(HttpSynthesizer::new(
        config.tts_api_url.clone(),
        config.tts_audio_format.clone(),
    ));

    // --- 4. Construct Session Store and Broker ---
    let sessions = Arc::new(SessionStore::new());
    let broker = Arc::new(Broker::new(
        sessions.clone(),
        recognizer,
        responder,
        synthesizer,
        system_prompt,
        config.stage_timeout,
        config.responder_streaming,
        config.busy_policy,
    ));

    let app_state = Arc::new(AppState {
        sessions,
        broker,
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        model = %config.chat_model,
        busy_policy = ?config.busy_policy,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
