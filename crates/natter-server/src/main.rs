mod config;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{
    HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use natter_api::conversation::Conversations;
use natter_api::media::CloudinaryClient;
use natter_api::textgen::{Assistant, GeminiClient};
use natter_api::AppStateInner;
use natter_db::Database;
use natter_gateway::{Dispatcher, PresenceRegistry};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "natter=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env();
    if config.has_placeholder_secret() {
        eprintln!("FATAL: NATTER_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    db.ensure_bot_user()?;
    info!("Database ready at {}", config.db_path.display());

    let dispatcher = Dispatcher::new(PresenceRegistry::new());

    let assistant = config.gemini.as_ref().map(|gemini| {
        info!("Assistant enabled with model {}", gemini.model);
        Assistant::new(
            Arc::new(GeminiClient::new(&gemini.api_key, &gemini.model)),
            config.bot_timeout,
        )
    });
    if assistant.is_none() {
        warn!("GEMINI_API_KEY is not set, bot replies will fail and summaries stay extractive");
    }

    let mut conversations = Conversations::new(db.clone(), dispatcher.clone());
    if let Some(assistant) = &assistant {
        conversations = conversations.with_assistant(assistant.clone());
    }
    if let Some(cdn) = &config.cloudinary {
        info!("Image hosting enabled for cloud {}", cdn.cloud_name);
        conversations = conversations.with_media_host(Arc::new(CloudinaryClient::new(
            &cdn.cloud_name,
            &cdn.api_key,
            &cdn.api_secret,
        )));
    }

    let state = AppStateInner::new(
        db,
        config.jwt_secret.clone(),
        dispatcher,
        conversations,
        assistant,
    );

    let allow_origin = if config.cors_origin == "*" {
        AllowOrigin::any()
    } else {
        AllowOrigin::exact(HeaderValue::from_str(&config.cors_origin)?)
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let app = natter_api::router(state)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = config.addr();
    info!("Natter server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = ctrl_c.await;
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("Received Ctrl+C, shutting down...");
    }
}
