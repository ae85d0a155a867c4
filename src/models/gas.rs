use chrono::Utc;
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Latest average fee observation for one chain. Storage keeps one per chain id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasFeeRecord {
    pub id: Uuid,
    pub chain_id: u64,
    pub decimal: u8,
    pub native_token_symbol: String,
    /// Average fee per transaction in the native token's smallest unit, as a decimal string.
    pub predict_fee: String,
    /// Unix seconds.
    pub timestamp: u64,
}

impl GasFeeRecord {
    pub fn new(chain_id: u64, decimal: u8, native_token_symbol: &str, predict_fee: U256) -> Self {
        Self {
            id: Uuid::new_v4(),
            chain_id,
            decimal,
            native_token_symbol: native_token_symbol.to_string(),
            // U256's Display is base 10
            predict_fee: predict_fee.to_string(),
            timestamp: Utc::now().timestamp().max(0) as u64,
        }
    }
}

/// Per-transaction fee inputs taken from a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeReceipt {
    pub effective_gas_price: U256,
    pub gas_used: U256,
}

impl FeeReceipt {
    pub fn new(effective_gas_price: impl Into<U256>, gas_used: impl Into<U256>) -> Self {
        Self {
            effective_gas_price: effective_gas_price.into(),
            gas_used: gas_used.into(),
        }
    }

    pub fn fee(&self) -> Option<U256> {
        self.effective_gas_price.checked_mul(self.gas_used)
    }
}
