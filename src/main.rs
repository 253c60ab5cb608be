use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weather_cache::cache::WeatherCache;
use weather_cache::config::Config;
use weather_cache::routes::{create_router, AppState};
use weather_cache::service::LookupService;
use weather_cache::store::{CacheStore, MemoryStore, RedisStore};
use weather_cache::weather::OpenWeatherClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_cache=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize cache store
    let store: Arc<dyn CacheStore> = match config.cache.redis_connection_info()? {
        Some(info) => Arc::new(
            RedisStore::connect(info)
                .await
                .context("while connecting to the cache store")?,
        ),
        None => {
            info!(
                "APP_CACHE_ADDRESS not set, caching in memory (max {} entries)",
                config.cache.max_entries
            );
            Arc::new(MemoryStore::new(config.cache.max_entries))
        }
    };
    let cache = WeatherCache::new(store, config.cache.ttl);

    // Initialize weather provider client
    let origin = Arc::new(OpenWeatherClient::new(
        config.weather_api.url.clone(),
        config.weather_api.key.clone(),
        config.weather_api.timeout,
    )?);

    let state = AppState {
        lookup: Arc::new(LookupService::new(cache, origin)),
    };
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("🦀 Weather server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
