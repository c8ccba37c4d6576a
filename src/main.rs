//! automute-sync binary entrypoint wiring the lease store, enforcer and REST layer.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use automute_sync::{
    config::AppConfig,
    dao::lease_store::{InMemoryLeaseStore, LeaseStore},
    routes,
    services::{
        enforcement::{Enforcer, LoggingEnforcer},
        storage_supervisor,
    },
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = build_store(&config).await?;
    let enforcer = build_enforcer()?;

    let app_state = AppState::new(config, store, enforcer);

    tokio::spawn(storage_supervisor::run(app_state.clone()));
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// MongoDB when `MONGO_URI` is set, otherwise a process-local store.
async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn LeaseStore>> {
    #[cfg(feature = "mongo-store")]
    if env::var_os("MONGO_URI").is_some() {
        use automute_sync::dao::lease_store::mongodb::{MongoConfig, MongoLeaseStore};

        let mongo_config = MongoConfig::from_env(config.lease_ttl)
            .await
            .context("reading MongoDB configuration")?;
        let store = MongoLeaseStore::connect(mongo_config)
            .await
            .context("connecting to MongoDB")?;
        info!("using MongoDB lease store");
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "mongo-store"))]
    if env::var_os("MONGO_URI").is_some() {
        warn!("MONGO_URI is set but the mongo-store feature is disabled");
    }
    info!(
        lease_ttl_ms = config.lease_ttl.as_millis() as u64,
        "using in-memory lease store; game state is lost on restart"
    );
    Ok(Arc::new(InMemoryLeaseStore::new(config.lease_ttl)))
}

/// HTTP enforcer when `ENFORCER_URL` is set, otherwise a logging no-op.
fn build_enforcer() -> anyhow::Result<Arc<dyn Enforcer>> {
    match env::var("ENFORCER_URL").ok().filter(|url| !url.is_empty()) {
        #[cfg(feature = "http-enforcement")]
        Some(url) => {
            let enforcer = automute_sync::services::enforcement::HttpEnforcer::new(&url)
                .context("building enforcement client")?;
            info!(%url, "dispatching changes to HTTP enforcer");
            Ok(Arc::new(enforcer))
        }
        #[cfg(not(feature = "http-enforcement"))]
        Some(_) => {
            warn!("ENFORCER_URL is set but the http-enforcement feature is disabled");
            Ok(Arc::new(LoggingEnforcer))
        }
        None => {
            warn!("ENFORCER_URL not set; changes will only be logged");
            Ok(Arc::new(LoggingEnforcer))
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
