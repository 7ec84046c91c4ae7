mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method, header::{AUTHORIZATION, CONTENT_TYPE}};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use pollhub_api::credentials::{Argon2Hasher, JwtIssuer};
use pollhub_api::AppStateInner;
use pollhub_core::memory::{MemoryPollRepository, MemoryUserRepository};
use pollhub_core::{IdentityService, PollRepository, PollService, UserRepository};
use pollhub_db::Database;

use crate::config::{Config, DEFAULT_LOG_FILTER, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init storage
    let (users, polls): (Arc<dyn UserRepository>, Arc<dyn PollRepository>) = match &config.store {
        Store::Sqlite(path) => {
            let db = Arc::new(Database::open(path)?);
            let users: Arc<dyn UserRepository> = db.clone();
            let polls: Arc<dyn PollRepository> = db;
            (users, polls)
        }
        Store::Memory => {
            info!("Using in-memory store; data is lost on restart");
            let users: Arc<dyn UserRepository> = Arc::new(MemoryUserRepository::default());
            let polls: Arc<dyn PollRepository> = Arc::new(MemoryPollRepository::default());
            (users, polls)
        }
    };

    // Shared state
    let identity = IdentityService::new(
        users,
        Arc::new(Argon2Hasher::default()),
        Arc::new(JwtIssuer::new(&config.jwt_secret, config.token_ttl)),
    );
    let state = Arc::new(AppStateInner {
        identity,
        polls: PollService::new(polls),
        trust_proxy: config.trust_proxy,
    });

    let app = pollhub_api::router(state)
        .layer(cors_layer(&config.cors_origins)?)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("pollhub listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    // Peer addresses feed the anonymous-voter fingerprint.
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    if origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }

    let origins = origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true))
}
