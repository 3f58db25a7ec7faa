use std::sync::Arc;

use notify_engine::api::{ApiServer, AppState};
use notify_engine::config::EngineConfig;
use notify_engine::database::{self, NotificationRepository, SqlxNotificationRepository};
use notify_engine::logging;
use notify_engine::notification::{
    DeliveryAdapters, EmailChannel, HttpRelayConfig, HttpRelayTransport,
    NotificationQueueManager, PushChannel,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = EngineConfig::from_env()?;

    // Initialize logging; the guard keeps the file writer alive
    let _log_guard = logging::init_logging(None, config.log_dir.as_deref())?;

    // Initialize database
    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;
    let repository: Arc<dyn NotificationRepository> =
        Arc::new(SqlxNotificationRepository::new(pool));

    let adapters = build_adapters(&config)?;
    tracing::info!(channels = ?adapters.kinds(), "Delivery adapters ready");

    let manager = NotificationQueueManager::new(config.queue.clone(), repository.clone(), adapters)?;
    let recovered = manager.initialize().await?;
    tracing::info!(recovered, "notify-engine initialized successfully");

    let server = ApiServer::new(&config.bind_address, AppState::new(manager.clone(), repository));
    let cancel_token = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down");
        }
        cancel_token.cancel();
    });

    let served = server.run().await;
    manager.shutdown().await;
    served?;

    Ok(())
}

fn build_adapters(config: &EngineConfig) -> anyhow::Result<DeliveryAdapters> {
    let mut adapters = DeliveryAdapters::new();

    if let Some(url) = &config.push_gateway_url {
        let relay = HttpRelayTransport::new(HttpRelayConfig {
            url: url.clone(),
            bearer_token: config.push_gateway_token.clone(),
            timeout_secs: config.transport_timeout_secs,
        })?;
        adapters.register(Arc::new(PushChannel::new(Arc::new(relay))));
    }

    if let Some(url) = &config.email_relay_url {
        let relay = HttpRelayTransport::new(HttpRelayConfig {
            url: url.clone(),
            bearer_token: config.email_relay_token.clone(),
            timeout_secs: config.transport_timeout_secs,
        })?;
        adapters.register(Arc::new(EmailChannel::new(Arc::new(relay))));
    }

    Ok(adapters)
}
