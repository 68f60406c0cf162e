//! Lightning Dispatch REST API server.

use dispatch_api::config::ServiceConfig;
use dispatch_api::server::{self, AppState};
use dispatch_engine::{DispatchConfig, LightningDispatcher};
use dispatch_push::{ExpoPushGateway, Notifier};
use dispatch_scheduler::{ReassignScheduler, SchedulerConfig};
use dispatch_store::{KvDispatchStore, KvMarketplaceStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env();
    let kv = config.open_kv_store().await?;
    tracing::info!(backend = ?config.store, path = %config.data_path.display(), "store opened");

    let gateway = ExpoPushGateway::from_env();
    tracing::info!(url = gateway.url(), "push gateway configured");
    let dispatcher = Arc::new(LightningDispatcher::new(
        Arc::new(KvDispatchStore::new(Arc::clone(&kv))),
        Arc::new(KvMarketplaceStore::new(kv)),
        Notifier::new(Arc::new(gateway)),
        DispatchConfig::from_env(),
    ));
    let scheduler = Arc::new(ReassignScheduler::new(
        Arc::clone(&dispatcher),
        SchedulerConfig::from_env(),
    ));

    let app = server::router(Arc::new(AppState {
        dispatcher,
        scheduler,
    }));
    let addr: SocketAddr = config.listen.parse()?;
    tracing::info!("Lightning Dispatch API listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .await?;
    Ok(())
}
