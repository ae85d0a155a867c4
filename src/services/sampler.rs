use crate::{error::OracleError, models::FeeReceipt, services::ChainClient};
use ethers::types::U256;
use std::sync::Arc;

/// Running totals over the sampled window.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlockFeeAggregate {
    pub total_fee_wei: U256,
    pub total_tx_count: u64,
}

impl BlockFeeAggregate {
    /// Adds one block. Absent receipts contribute no fee but their
    /// transactions still count.
    pub fn absorb_block(
        &mut self,
        block_number: u64,
        tx_count: usize,
        receipts: &[Option<FeeReceipt>],
    ) -> Result<U256, OracleError> {
        if receipts.len() > tx_count {
            return Err(OracleError::PartialData(format!(
                "block {block_number} returned {} receipts for {tx_count} transactions",
                receipts.len()
            )));
        }

        let mut block_fee = U256::zero();
        for receipt in receipts.iter().flatten() {
            block_fee = receipt
                .fee()
                .and_then(|fee| block_fee.checked_add(fee))
                .ok_or(OracleError::FeeOverflow(block_number))?;
        }

        self.total_fee_wei = self
            .total_fee_wei
            .checked_add(block_fee)
            .ok_or(OracleError::FeeOverflow(block_number))?;
        self.total_tx_count += tx_count as u64;

        Ok(block_fee)
    }

    /// Truncating average fee per transaction, zero for an idle window.
    pub fn average_fee(&self) -> U256 {
        if self.total_tx_count == 0 {
            return U256::zero();
        }
        self.total_fee_wei / U256::from(self.total_tx_count)
    }
}

/// Walks the most recent `window_size` blocks of one chain and averages the
/// fee paid per transaction.
pub struct FeeSampler {
    chain_id: u64,
    window_size: u64,
    client: Arc<dyn ChainClient>,
}

impl FeeSampler {
    pub fn new(chain_id: u64, window_size: u64, client: Arc<dyn ChainClient>) -> Self {
        Self {
            chain_id,
            window_size,
            client,
        }
    }

    /// Any failed call aborts the whole sample; partial windows are never averaged.
    pub async fn sample(&self) -> Result<U256, OracleError> {
        let chain_id = self.chain_id;
        let latest = self.client.latest_block_number().await.map_err(|e| {
            tracing::error!(chain_id, error = %e, "Failed to get latest block");
            e
        })?;

        tracing::info!(
            chain_id,
            latest,
            window_size = self.window_size,
            "Start sampling block fees"
        );

        let mut aggregate = BlockFeeAggregate::default();

        for offset in 0..self.window_size {
            let block_number = latest.checked_sub(offset).ok_or_else(|| {
                OracleError::NotFound(format!(
                    "chain {chain_id} has fewer than {} blocks",
                    self.window_size
                ))
            })?;

            let txs = self
                .client
                .block_transactions(block_number)
                .await
                .map_err(|e| {
                    tracing::error!(chain_id, block_number, error = %e, "Failed to get block");
                    e
                })?;

            tracing::debug!(chain_id, block_number, tx_len = txs.len(), "Fetched block");
            if txs.is_empty() {
                continue;
            }

            let receipts = self
                .client
                .block_receipts(block_number)
                .await
                .map_err(|e| {
                    tracing::error!(
                        chain_id,
                        block_number,
                        error = %e,
                        "Failed to get block receipts"
                    );
                    e
                })?;

            let skipped = txs.len() - receipts.iter().flatten().count().min(txs.len());
            if skipped > 0 {
                tracing::warn!(chain_id, block_number, skipped, "Skipping missing receipts");
            }

            let block_fee = aggregate.absorb_block(block_number, txs.len(), &receipts)?;
            tracing::debug!(
                chain_id,
                block_number,
                block_fee = %block_fee,
                txs = txs.len(),
                "Block processed"
            );
        }

        let average = aggregate.average_fee();
        tracing::info!(
            chain_id,
            fee = %average,
            total_txs = aggregate.total_tx_count,
            "Estimated average fee"
        );

        Ok(average)
    }
}
