use crate::{
    handlers::AppState,
    models::{ChainHealth, HealthStatus},
    services::GasFeeStore,
};
use axum::{extract::State, Json};
use chrono::Utc;
use futures::future::join_all;

pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let redis_ok = state.storage.ping().await;

    let chains: Vec<ChainHealth> = join_all(state.chain_ids.iter().map(|&chain_id| {
        let storage = state.storage.clone();
        async move {
            let last_sample = storage.get_gas_fee(chain_id).await.ok();
            ChainHealth {
                chain_id,
                last_sample_timestamp: last_sample.map(|r| r.timestamp),
            }
        }
    }))
    .await;

    let sampled = chains.iter().all(|c| c.last_sample_timestamp.is_some());
    let status = if sampled && (redis_ok || !state.storage.has_redis()) {
        "healthy"
    } else if chains.iter().any(|c| c.last_sample_timestamp.is_some()) {
        "degraded"
    } else {
        "unhealthy"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        redis: redis_ok,
        chains,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
    })
}
