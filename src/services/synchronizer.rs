use crate::{
    config::ChainConfig,
    error::OracleError,
    models::GasFeeRecord,
    services::{ChainClient, FeeSampler, GasFeeStore},
};
use std::{fmt::Display, future::Future, sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::{JoinHandle, JoinSet},
    time::{interval, MissedTickBehavior},
};

/// Periodic driver for one chain: sample, then upsert the record.
pub struct OracleSynchronizer {
    chain: ChainConfig,
    sampler: FeeSampler,
    store: Arc<dyn GasFeeStore>,
}

impl OracleSynchronizer {
    pub fn new(
        chain: ChainConfig,
        client: Arc<dyn ChainClient>,
        store: Arc<dyn GasFeeStore>,
    ) -> Self {
        let sampler = FeeSampler::new(chain.chain_id, chain.window_size, client);
        Self {
            chain,
            sampler,
            store,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain.chain_id
    }

    /// Runs one tick. Sample failures are logged and swallowed so the next
    /// tick retries; only a failed write is returned.
    pub async fn tick(&self) -> Result<Option<GasFeeRecord>, OracleError> {
        let chain_id = self.chain.chain_id;

        let fee = match self.sampler.sample().await {
            Ok(fee) => fee,
            Err(e) => {
                tracing::error!(
                    chain_id,
                    error = %e,
                    "Gas fee sample failed, keeping previous record"
                );
                return Ok(None);
            }
        };

        let record = GasFeeRecord::new(
            chain_id,
            self.chain.decimal,
            &self.chain.native_token_symbol,
            fee,
        );

        self.store.upsert_gas_fee(&record).await.map_err(|e| {
            tracing::error!(chain_id, error = %e, "Store or update gas fee failed");
            match e {
                OracleError::Persistence(msg) => OracleError::Persistence(msg),
                other => OracleError::Persistence(other.to_string()),
            }
        })?;

        tracing::info!(chain_id, fee = %record.predict_fee, "Stored gas fee");
        Ok(Some(record))
    }

    /// Ticks on a fixed interval until `stop_receiver` flips. An in-flight
    /// tick always finishes; missed ticks are not queued.
    pub async fn run(self, mut stop_receiver: watch::Receiver<bool>) -> Result<(), OracleError> {
        let chain_id = self.chain.chain_id;
        tracing::info!(
            chain_id,
            "Starting gas fee synchronizer with interval {:?}",
            self.chain.poll_interval
        );

        let mut ticker = interval(self.chain.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *stop_receiver.borrow() {
                break;
            }

            tokio::select! {
                changed = stop_receiver.changed() => {
                    if changed.is_err() {
                        tracing::warn!(chain_id, "Stop sender dropped, shutting down synchronizer");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.tick().await?;
                }
            }
        }

        tracing::info!(chain_id, "Gas fee synchronizer stopped");
        Ok(())
    }
}

/// Why the service is going down.
#[derive(Debug)]
pub enum ShutdownCause {
    Signal,
    /// Every loop returned without error.
    LoopsFinished,
    Critical(OracleError),
    /// The HTTP server ended on its own; its handle is already consumed.
    ServerExited(String),
}

/// One synchronizer task per chain, sharing a single stop signal.
pub struct SynchronizerGroup {
    tasks: JoinSet<(u64, Result<(), OracleError>)>,
    stop_sender: watch::Sender<bool>,
}

impl Default for SynchronizerGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl SynchronizerGroup {
    pub fn new() -> Self {
        let (stop_sender, _) = watch::channel(false);
        Self {
            tasks: JoinSet::new(),
            stop_sender,
        }
    }

    pub fn stop_receiver(&self) -> watch::Receiver<bool> {
        self.stop_sender.subscribe()
    }

    pub fn spawn(&mut self, synchronizer: OracleSynchronizer) {
        let chain_id = synchronizer.chain_id();
        let stop_receiver = self.stop_receiver();
        self.tasks
            .spawn(async move { (chain_id, synchronizer.run(stop_receiver).await) });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for the first critical failure. Returns `None` once every task
    /// has exited cleanly.
    pub async fn wait_critical(&mut self) -> Option<OracleError> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((chain_id, Err(e))) => {
                    tracing::error!(chain_id, error = %e, "Critical error in gas fee synchronizer");
                    return Some(e);
                }
                Err(e) => {
                    return Some(OracleError::Internal(format!("synchronizer task failed: {e}")));
                }
            }
        }
        None
    }

    /// Waits for whichever comes first: `signal`, a critical loop error, or
    /// `server` exiting before it was asked to stop.
    pub async fn wait_shutdown<S, E>(
        &mut self,
        signal: S,
        server: &mut JoinHandle<Result<(), E>>,
    ) -> ShutdownCause
    where
        S: Future<Output = ()>,
        E: Display,
    {
        tokio::select! {
            _ = signal => ShutdownCause::Signal,
            critical = self.wait_critical() => match critical {
                Some(e) => ShutdownCause::Critical(e),
                None => ShutdownCause::LoopsFinished,
            },
            joined = server => {
                let reason = match joined {
                    Ok(Ok(())) => "server stopped unexpectedly".to_string(),
                    Ok(Err(e)) => format!("server error: {e}"),
                    Err(e) => format!("server task failed: {e}"),
                };
                tracing::error!(reason = %reason, "HTTP server exited");
                ShutdownCause::ServerExited(reason)
            }
        }
    }

    pub fn stop(&self) {
        self.stop_sender.send_replace(true);
    }

    /// Signals stop and waits up to `timeout` for in-flight ticks to finish.
    pub async fn shutdown(mut self, timeout: Duration) {
        self.stop();

        let drain = async {
            while let Some(joined) = self.tasks.join_next().await {
                if let Ok((chain_id, Err(e))) = joined {
                    tracing::error!(
                        chain_id,
                        error = %e,
                        "Synchronizer exited with error during shutdown"
                    );
                }
            }
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            tracing::warn!("Synchronizers did not stop within {:?}, aborting", timeout);
            self.tasks.abort_all();
        }
    }
}
