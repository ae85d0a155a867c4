pub mod gas;
pub mod health;

pub use gas::*;
pub use health::*;

use crate::services::{FeeConversionService, StorageService};
use axum::{
    routing::{get, post},
    Router,
};
use std::{sync::Arc, time::Instant};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<StorageService>,
    pub conversion: Arc<FeeConversionService>,
    pub chain_ids: Arc<Vec<u64>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(storage: Arc<StorageService>, chain_ids: Vec<u64>) -> Self {
        let conversion = Arc::new(FeeConversionService::new(storage.clone(), storage.clone()));
        Self {
            storage,
            conversion,
            chain_ids: Arc::new(chain_ids),
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/gas/price", post(token_gas_price))
        .route("/api/gas/fee/:chain_id", get(latest_gas_fee))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::RETURN_CODE_SUCCESS,
        models::{GasFeeRecord, HealthStatus, TokenGasPriceResponse, TokenPriceQuote},
        services::GasFeeStore,
    };
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use ethers::types::U256;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    async fn state_with_fee() -> AppState {
        let storage = Arc::new(StorageService::in_memory());
        for (symbol, price) in [("ETH", "2000.00"), ("USDC", "1.00"), ("FREE", "0")] {
            storage
                .upsert_market_price(&TokenPriceQuote::new(symbol, price))
                .await
                .unwrap();
        }
        storage
            .upsert_gas_fee(&GasFeeRecord::new(
                1,
                18,
                "ETH",
                U256::from_dec_str("1000000000000000").unwrap(),
            ))
            .await
            .unwrap();
        AppState::new(storage, vec![1, 10])
    }

    async fn post_price(state: AppState, body: &str) -> (StatusCode, TokenGasPriceResponse) {
        let response = router(state)
            .oneshot(
                Request::post("/api/gas/price")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        (status, read_json(response.into_body()).await)
    }

    async fn read_json<T: DeserializeOwned>(body: Body) -> T {
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn converts_fee_for_target_symbol() {
        let (status, body) =
            post_price(state_with_fee().await, r#"{"chainId":1,"targetSymbol":"USDC"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status_code, RETURN_CODE_SUCCESS);
        // 0.001 ETH at 2000
        assert_eq!(body.predict_fee, "2.00000000");
        assert_eq!(body.symbol, "USDC");
        assert_eq!(body.market_price, "1.00");
    }

    #[tokio::test]
    async fn unknown_chain_is_not_found() {
        let (status, body) =
            post_price(state_with_fee().await, r#"{"chainId":10,"targetSymbol":"USDC"}"#).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.status_code, 404);
        assert!(body.predict_fee.is_empty());
    }

    #[tokio::test]
    async fn zero_price_target_is_rejected() {
        let (status, body) =
            post_price(state_with_fee().await, r#"{"chainId":1,"targetSymbol":"FREE"}"#).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.status_code, 422);
        assert!(body.message.contains("zero"));
    }

    #[tokio::test]
    async fn malformed_body_keeps_response_shape() {
        let (status, body) =
            post_price(state_with_fee().await, r#"{"chainId":"abc","targetSymbol":"USDC"}"#).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.status_code, 422);
        assert!(body.predict_fee.is_empty());
        assert!(!body.message.is_empty());

        let (status, body) = post_price(state_with_fee().await, r#"{"chainId":1,"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.status_code, 400);
        assert!(body.symbol.is_empty());
    }

    #[tokio::test]
    async fn serves_latest_record() {
        let response = router(state_with_fee().await)
            .oneshot(Request::get("/api/gas/fee/1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let record: GasFeeRecord = read_json(response.into_body()).await;
        assert_eq!(record.predict_fee, "1000000000000000");

        let response = router(state_with_fee().await)
            .oneshot(Request::get("/api/gas/fee/10").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_unsampled_chains() {
        let response = router(state_with_fee().await)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let health: HealthStatus = read_json(response.into_body()).await;

        assert_eq!(health.status, "degraded");
        assert!(!health.redis);
        assert_eq!(health.chains.len(), 2);
        assert!(health.chains[0].last_sample_timestamp.is_some());
        assert!(health.chains[1].last_sample_timestamp.is_none());
    }
}
