use crate::{
    error::{OracleError, RETURN_CODE_SUCCESS},
    handlers::AppState,
    models::{GasFeeRecord, TokenGasPriceRequest, TokenGasPriceResponse},
    services::GasFeeStore,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};

/// Converts the chain's latest average fee into `target_symbol`.
///
/// Failures, including an unreadable request body, still answer with the full
/// response body; `status_code` carries the same value as the HTTP status.
pub async fn token_gas_price(
    State(state): State<AppState>,
    payload: Result<Json<TokenGasPriceRequest>, JsonRejection>,
) -> (StatusCode, Json<TokenGasPriceResponse>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let status = rejection.status();
            tracing::warn!(status = %status, error = %rejection, "Rejected gas price request");
            return (
                status,
                Json(TokenGasPriceResponse {
                    predict_fee: String::new(),
                    symbol: String::new(),
                    market_price: String::new(),
                    status_code: status.as_u16(),
                    message: rejection.body_text(),
                }),
            );
        }
    };

    match state
        .conversion
        .convert(request.chain_id, &request.target_symbol)
        .await
    {
        Ok(conversion) => (
            StatusCode::OK,
            Json(TokenGasPriceResponse {
                predict_fee: conversion.predict_fee,
                symbol: conversion.symbol,
                market_price: conversion.market_price,
                status_code: RETURN_CODE_SUCCESS,
                message: "get gas fee success".to_string(),
            }),
        ),
        Err(e) => {
            let status = e.status_code();
            tracing::error!(
                chain_id = request.chain_id,
                symbol = %request.target_symbol,
                error = %e,
                error_code = e.error_code(),
                "Gas fee conversion failed"
            );
            (
                status,
                Json(TokenGasPriceResponse {
                    predict_fee: String::new(),
                    symbol: request.target_symbol,
                    market_price: String::new(),
                    status_code: status.as_u16(),
                    message: e.to_string(),
                }),
            )
        }
    }
}

pub async fn latest_gas_fee(
    State(state): State<AppState>,
    Path(chain_id): Path<u64>,
) -> Result<Json<GasFeeRecord>, OracleError> {
    let record = state.storage.get_gas_fee(chain_id).await?;
    Ok(Json(record))
}
