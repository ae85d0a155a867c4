use crate::{
    error::OracleError,
    services::{GasFeeStore, PriceStore},
};
use ethers::{types::U256, utils::format_units};
use std::sync::Arc;

/// Stored fee expressed in a target token.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeConversion {
    /// Fixed to 8 decimals.
    pub predict_fee: String,
    pub symbol: String,
    pub market_price: String,
}

pub struct FeeConversionService {
    gas_fees: Arc<dyn GasFeeStore>,
    prices: Arc<dyn PriceStore>,
}

impl FeeConversionService {
    pub fn new(gas_fees: Arc<dyn GasFeeStore>, prices: Arc<dyn PriceStore>) -> Self {
        Self { gas_fees, prices }
    }

    pub async fn convert(
        &self,
        chain_id: u64,
        target_symbol: &str,
    ) -> Result<FeeConversion, OracleError> {
        let gas_fee = self.gas_fees.get_gas_fee(chain_id).await?;
        let native = self
            .prices
            .get_market_price(&gas_fee.native_token_symbol)
            .await?;
        let target = self.prices.get_market_price(target_symbol).await?;

        tracing::info!(
            chain_id,
            predict_fee = %gas_fee.predict_fee,
            native = %gas_fee.native_token_symbol,
            decimal = gas_fee.decimal,
            target = target_symbol,
            target_price = %target.market_price,
            "Converting gas fee"
        );

        let predict_fee = convert_fee(
            &gas_fee.predict_fee,
            gas_fee.decimal,
            &native.market_price,
            &target.market_price,
        )?;

        Ok(FeeConversion {
            predict_fee,
            symbol: target_symbol.to_string(),
            market_price: target.market_price,
        })
    }
}

/// `(fee / 10^decimal) * (native_price / target_price)` formatted to 8 decimals.
///
/// The fee is scaled exactly as an integer; floating point only enters for the
/// final price ratio.
pub fn convert_fee(
    predict_fee: &str,
    decimal: u8,
    native_price: &str,
    target_price: &str,
) -> Result<String, OracleError> {
    let fee = U256::from_dec_str(predict_fee)
        .map_err(|e| OracleError::Conversion(format!("invalid stored fee {predict_fee:?}: {e}")))?;

    let whole_units: f64 = format_units(fee, u32::from(decimal))
        .map_err(|e| OracleError::Conversion(format!("cannot scale fee by 10^{decimal}: {e}")))?
        .parse()
        .map_err(|e| OracleError::Conversion(format!("cannot scale fee by 10^{decimal}: {e}")))?;

    let native_price = parse_price(native_price)?;
    if native_price == 0.0 {
        return Err(OracleError::Conversion("native market price is zero".to_string()));
    }
    let target_price = parse_price(target_price)?;
    if target_price == 0.0 {
        return Err(OracleError::Conversion("target market price is zero".to_string()));
    }

    let value = whole_units * (native_price / target_price);
    if !value.is_finite() {
        return Err(OracleError::Conversion(format!("conversion overflowed: {value}")));
    }

    Ok(format!("{value:.8}"))
}

fn parse_price(raw: &str) -> Result<f64, OracleError> {
    let price: f64 = raw
        .trim()
        .parse()
        .map_err(|_| OracleError::Conversion(format!("malformed market price {raw:?}")))?;

    if !price.is_finite() || price < 0.0 {
        return Err(OracleError::Conversion(format!("invalid market price {raw:?}")));
    }
    Ok(price)
}
