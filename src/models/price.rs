use serde::{Deserialize, Serialize};

/// Market price of a token in the common reference currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPriceQuote {
    pub symbol: String,
    pub market_price: String,
}

impl TokenPriceQuote {
    pub fn new(symbol: impl Into<String>, market_price: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            market_price: market_price.into(),
        }
    }
}
