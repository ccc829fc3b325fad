mod api;
mod auth;
mod auto_id;
mod config;
mod config_api;
mod dataset;
mod error;
mod metrics;
mod model;
mod period;
mod pipeline;
mod query;
mod record;
mod redis_store;
mod schema;
mod staleness;
mod store;
mod timestamp;
mod validation;

use std::sync::Arc;

use anyhow::Context;
use api::AppState;
use config::AppConfig;
use config_api::HttpConfigSource;
use metrics::Metrics;
use redis_store::RedisStore;
use store::{MemoryStore, Store};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cfg = AppConfig::from_env()?;
    init_tracing(cfg.log_json);

    let store = build_store(cfg.redis_url.as_deref())?;
    let config = HttpConfigSource::try_new(cfg.config_api.clone())
        .context("failed to build config API client")?;
    let metrics = Metrics::new().context("failed to register metrics")?;

    let state = AppState {
        store,
        config: Arc::new(config),
        metrics,
    };

    let app = api::router(state).layer(TraceLayer::new_for_http());

    let listen_addr = cfg.listen_addr();
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    tracing::info!(%listen_addr, config_api = %cfg.config_api.base_url, "starting datastore");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("datastore exited cleanly");

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_store(redis_url: Option<&str>) -> anyhow::Result<Arc<dyn Store>> {
    match redis_url {
        Some(url) => {
            let store = RedisStore::new(url).context("invalid DATASTORE_REDIS_URL")?;
            tracing::info!("using redis storage");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATASTORE_REDIS_URL not set; records are kept in memory and lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term_signal) => term_signal.recv().await,
            Err(error) => {
                tracing::warn!(%error, "failed to install SIGTERM handler");
                None
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
