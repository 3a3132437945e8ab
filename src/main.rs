//! OpenSASE Product Sort - storefront product ordering service

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opensase_product_sort::api::{self, AppState};
use opensase_product_sort::notifier::NatsForwarder;
use opensase_product_sort::store::{InMemoryProductStore, PgProductStore, ProductStore};
use opensase_product_sort::{CatalogService, Config, EventBus, RankService, RankSubscriber};

async fn serve<S: ProductStore>(store: Arc<S>, config: &Config, nats: Option<async_nats::Client>) -> Result<()> {
    let bus = EventBus::new();
    let ranks = RankService::new(store.clone());
    RankSubscriber::register(ranks.clone(), &bus);
    if let Some(client) = nats {
        bus.subscribe_all(Arc::new(NatsForwarder::new(client)));
    }
    let state = AppState { ranks, catalog: CatalogService::new(store, bus) };
    let app = api::router(state);

    tracing::info!("🚀 OpenSASE Product Sort listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    let config = Config::from_env()?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, product events stay in-process");
                None
            }
        },
        None => None,
    };

    match &config.database_url {
        Some(url) => {
            let store = PgProductStore::connect(url, config.database_max_connections, config.rank_lock_timeout).await?;
            store.migrate().await?;
            serve(Arc::new(store), &config, nats).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory product store");
            serve(Arc::new(InMemoryProductStore::with_lock_timeout(config.rank_lock_timeout)), &config, nats).await
        }
    }
}
