use anyhow::{bail, Result};
use gas_oracle::{
    config::Config,
    handlers::{router, AppState},
    services::{
        EthereumClient, OracleSynchronizer, ShutdownCause, StorageService, SynchronizerGroup,
    },
};
use std::{future::IntoFuture, sync::Arc};
use tokio::{sync::watch, task::JoinHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting gas oracle v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    // Initialize services
    let storage = Arc::new(StorageService::new(&config.redis_url).await);
    for quote in &config.static_prices {
        storage.upsert_market_price(quote).await?;
    }

    let mut synchronizers = SynchronizerGroup::new();
    for chain in &config.chains {
        let client = Arc::new(
            EthereumClient::connect(chain.chain_id, &chain.rpc_url, chain.rpc_fallback.as_deref())
                .await?,
        );
        synchronizers.spawn(OracleSynchronizer::new(chain.clone(), client, storage.clone()));
    }

    let chain_ids = config.chains.iter().map(|c| c.chain_id).collect();
    let app = router(AppState::new(storage, chain_ids));

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    let mut server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_stop(synchronizers.stop_receiver()))
            .into_future(),
    );

    let cause = synchronizers.wait_shutdown(shutdown_signal(), &mut server).await;

    tracing::info!("Shutting down gracefully...");
    synchronizers.shutdown(config.shutdown_timeout).await;

    match cause {
        ShutdownCause::Critical(e) => {
            join_server(server).await;
            bail!("critical error in gas fee synchronizer: {e}");
        }
        ShutdownCause::ServerExited(reason) => bail!("HTTP server exited: {reason}"),
        ShutdownCause::Signal | ShutdownCause::LoopsFinished => {
            join_server(server).await;
            Ok(())
        }
    }
}

async fn join_server(server: JoinHandle<std::io::Result<()>>) {
    match server.await {
        Ok(Err(e)) => tracing::error!("Server error: {}", e),
        Err(e) => tracing::error!("Server task failed: {}", e),
        Ok(Ok(())) => {}
    }
}

async fn wait_for_stop(mut stop_receiver: watch::Receiver<bool>) {
    if stop_receiver.wait_for(|stopped| *stopped).await.is_err() {
        tracing::warn!("Stop sender dropped without a signal");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl+c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received ctrl+c");
}
