use anyhow::{Context, Result};
use lutra::api::{create_auth_router, create_info_router, AuthAppState};
use lutra::config::{load_settings, Settings};
use lutra::crypto::SecretCodec;
use lutra::db::Database;
use lutra::eventsub::{run_event_session, EventSession, SubscriptionFanout};
use lutra::oauth::{run_state_sweeper, AuthPipeline, StateManager, STATE_TTL_SECONDS};
use lutra::provider::registry_from_settings;
use lutra::tokens::{TokenRefresher, TokenStore};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lutra=info".into()),
        )
        .init();

    info!("Lutra starting...");

    // Read configuration
    let config_path = std::env::var("LUTRA_CONFIG").unwrap_or_else(|_| "lutra.toml".to_string());
    let settings = if std::path::Path::new(&config_path).exists() {
        load_settings(&config_path)?
    } else {
        info!(path = %config_path, "No config file found, using defaults");
        Settings::default()
    };

    let master_key = std::env::var("LUTRA_MASTER_KEY")
        .context("LUTRA_MASTER_KEY is required (base64-encoded 32-byte key)")?;

    info!(
        bind_addr = %settings.server.bind_addr,
        database = %settings.database.path,
        eventsub_enabled = settings.eventsub.enabled,
        "Configuration loaded"
    );

    // Token sealing and persistence
    let codec = SecretCodec::new(&master_key).context("Failed to initialize token crypto")?;
    let db = Arc::new(Database::open(&settings.database.path).context("Failed to open database")?);
    info!("Database opened");

    // Outbound HTTP client shared by providers and the fan-out
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    let registry = Arc::new(
        registry_from_settings(&settings.providers, http.clone())
            .context("Failed to initialize OAuth providers")?,
    );

    let tokens = Arc::new(TokenStore::new(Arc::clone(&db), codec));
    let states = StateManager::new(Arc::clone(&db));
    let refresher = Arc::new(TokenRefresher::new(
        Arc::clone(&registry),
        Arc::clone(&tokens),
    ));
    let pipeline = Arc::new(AuthPipeline::new(
        Arc::clone(&registry),
        states.clone(),
        Arc::clone(&tokens),
        Arc::clone(&db),
    ));

    // Background sweep of expired CSRF states
    tokio::spawn(run_state_sweeper(states.clone(), STATE_TTL_SECONDS as u64));

    // EventSub session
    if settings.eventsub.enabled {
        let twitch = registry.get("twitch")?;
        let fanout = Arc::new(SubscriptionFanout::new(
            Arc::clone(&db),
            Arc::clone(&refresher),
            http.clone(),
            settings.eventsub.subscription_endpoint.clone(),
            twitch.config().client_id.clone(),
        ));
        let session = Arc::new(EventSession::new(fanout));
        tokio::spawn(run_event_session(
            session,
            settings.eventsub.websocket_url.clone(),
        ));
        info!(url = %settings.eventsub.websocket_url, "EventSub session started");
    }

    // HTTP server
    let router = create_auth_router(AuthAppState { pipeline })
        .merge(create_info_router())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&settings.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.bind_addr))?;
    info!(addr = %settings.server.bind_addr, "API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("Lutra stopped");

    Ok(())
}
