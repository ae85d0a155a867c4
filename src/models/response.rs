use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TokenGasPriceRequest {
    pub chain_id: u64,
    pub target_symbol: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenGasPriceResponse {
    /// Fee in target token units, fixed to 8 decimals. Empty on failure.
    pub predict_fee: String,
    pub symbol: String,
    pub market_price: String,
    pub status_code: u16,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ChainHealth {
    pub chain_id: u64,
    pub last_sample_timestamp: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub redis: bool,
    pub chains: Vec<ChainHealth>,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}
