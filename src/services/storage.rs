use crate::{
    error::OracleError,
    models::{GasFeeRecord, TokenPriceQuote},
};
use async_trait::async_trait;
use moka::future::Cache;
use redis::AsyncCommands;
use std::time::Duration;

/// Latest-fee records keyed by chain id. Upserts replace, never accumulate.
#[async_trait]
pub trait GasFeeStore: Send + Sync {
    async fn upsert_gas_fee(&self, record: &GasFeeRecord) -> Result<(), OracleError>;

    async fn get_gas_fee(&self, chain_id: u64) -> Result<GasFeeRecord, OracleError>;
}

/// Current market prices by token symbol.
#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn get_market_price(&self, symbol: &str) -> Result<TokenPriceQuote, OracleError>;
}

/// Read cache lifetime in front of redis. Other writers become visible after this.
const REDIS_READ_TTL: Duration = Duration::from_secs(5);

fn gas_fee_key(chain_id: u64) -> String {
    format!("gas_fee:{chain_id}")
}

fn token_price_key(symbol: &str) -> String {
    format!("token_price:{symbol}")
}

/// Redis-backed store with an in-memory layer.
///
/// Without redis the in-memory layer is the store itself and never expires.
/// With redis it is a short-lived read cache, and writes go to redis first.
pub struct StorageService {
    redis: Option<redis::aio::ConnectionManager>,
    gas_fees: Cache<u64, GasFeeRecord>,
    prices: Cache<String, TokenPriceQuote>,
}

impl StorageService {
    pub async fn new(redis_url: &str) -> Self {
        let redis = match redis::Client::open(redis_url) {
            Ok(client) => match client.get_connection_manager().await {
                Ok(conn) => {
                    tracing::info!("Redis connected successfully");
                    Some(conn)
                }
                Err(e) => {
                    tracing::warn!("Redis connection failed: {}, using memory store only", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Redis client creation failed: {}, using memory store only", e);
                None
            }
        };

        Self::with_redis(redis)
    }

    pub fn in_memory() -> Self {
        Self::with_redis(None)
    }

    fn with_redis(redis: Option<redis::aio::ConnectionManager>) -> Self {
        let (gas_fees, prices) = if redis.is_some() {
            (
                Cache::builder().time_to_live(REDIS_READ_TTL).build(),
                Cache::builder().time_to_live(REDIS_READ_TTL).build(),
            )
        } else {
            (Cache::builder().build(), Cache::builder().build())
        };

        Self {
            redis,
            gas_fees,
            prices,
        }
    }

    pub fn has_redis(&self) -> bool {
        self.redis.is_some()
    }

    pub async fn upsert_market_price(&self, quote: &TokenPriceQuote) -> Result<(), OracleError> {
        if let Some(mut redis) = self.redis.clone() {
            let serialized = serde_json::to_string(quote)?;
            redis
                .set::<_, _, ()>(token_price_key(&quote.symbol), serialized)
                .await
                .map_err(|e| OracleError::Persistence(e.to_string()))?;
        }

        self.prices.insert(quote.symbol.clone(), quote.clone()).await;
        tracing::debug!(symbol = %quote.symbol, price = %quote.market_price, "Stored market price");
        Ok(())
    }

    pub async fn ping(&self) -> bool {
        if let Some(mut redis) = self.redis.clone() {
            redis::cmd("PING")
                .query_async::<_, String>(&mut redis)
                .await
                .is_ok()
        } else {
            false
        }
    }

    async fn redis_get(&self, key: &str) -> Result<Option<String>, OracleError> {
        match self.redis.clone() {
            Some(mut redis) => redis
                .get::<_, Option<String>>(key)
                .await
                .map_err(|e| OracleError::Unavailable(format!("redis read of {key}: {e}"))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl GasFeeStore for StorageService {
    async fn upsert_gas_fee(&self, record: &GasFeeRecord) -> Result<(), OracleError> {
        if let Some(mut redis) = self.redis.clone() {
            let serialized = serde_json::to_string(record)?;
            redis
                .set::<_, _, ()>(gas_fee_key(record.chain_id), serialized)
                .await
                .map_err(|e| OracleError::Persistence(e.to_string()))?;
        }

        self.gas_fees.insert(record.chain_id, record.clone()).await;
        tracing::debug!(chain_id = record.chain_id, fee = %record.predict_fee, "Stored gas fee");
        Ok(())
    }

    async fn get_gas_fee(&self, chain_id: u64) -> Result<GasFeeRecord, OracleError> {
        if let Some(record) = self.gas_fees.get(&chain_id).await {
            return Ok(record);
        }

        let record: GasFeeRecord = match self.redis_get(&gas_fee_key(chain_id)).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => return Err(OracleError::NotFound(format!("gas fee of chain {chain_id}"))),
        };

        self.gas_fees.insert(chain_id, record.clone()).await;
        Ok(record)
    }
}

#[async_trait]
impl PriceStore for StorageService {
    async fn get_market_price(&self, symbol: &str) -> Result<TokenPriceQuote, OracleError> {
        if let Some(quote) = self.prices.get(symbol).await {
            return Ok(quote);
        }

        let quote: TokenPriceQuote = match self.redis_get(&token_price_key(symbol)).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => return Err(OracleError::NotFound(format!("market price of {symbol}"))),
        };

        self.prices.insert(symbol.to_string(), quote.clone()).await;
        Ok(quote)
    }
}
