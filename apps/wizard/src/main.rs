mod config;
mod document;
mod draft_client;
mod errors;
mod models;
mod preview;
mod routes;
mod state;
mod sync;
mod validation;
mod wizard;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::draft_client::{DraftApiClient, DraftStore};
use crate::routes::build_router;
use crate::state::AppState;
use crate::sync::retry::bounded;
use crate::wizard::{Collaborators, WizardController, WizardSession};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CV wizard v{}", env!("CARGO_PKG_VERSION"));

    // Initialize draft service client
    let client = Arc::new(DraftApiClient::new(
        &config.draft_api_url,
        config.request_timeout,
    )?);
    info!("Draft service client initialized ({})", config.draft_api_url);

    // Resume an existing draft or start blank
    let controller = match &config.resume_draft_id {
        Some(id) => {
            let mut document = bounded(config.request_timeout, client.fetch_draft(id))
                .await
                .with_context(|| format!("Failed to load draft {id}"))?;
            document.id = Some(id.clone());
            info!("Resuming draft {id} at {}", document.revision);
            WizardController::resume(document)
        }
        None => WizardController::new(),
    };

    let wizard = WizardSession::spawn(
        controller,
        Collaborators::shared(Arc::clone(&client)),
        config.session(),
    );
    info!(
        "Wizard session ready (debounce {}ms, {:?} validation)",
        config.save_debounce.as_millis(),
        config.validation_mode
    );

    // Build app state
    let state = AppState {
        wizard,
        catalog: client,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
