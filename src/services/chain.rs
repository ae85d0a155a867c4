use crate::{error::OracleError, models::FeeReceipt};
use async_trait::async_trait;
use ethers::{
    providers::{Http, Provider, ProviderError},
    types::{BlockNumber, H256, U256, U64},
};
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc};

/// Read-only view of a chain used by the fee sampler.
///
/// `block_receipts` is positionally aligned with `block_transactions`, but
/// callers must not assume the two have the same length. A `None` entry is a
/// receipt the node could not return and is skipped, not counted as zero.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn latest_block_number(&self) -> Result<u64, OracleError>;

    async fn block_transactions(&self, number: u64) -> Result<Vec<H256>, OracleError>;

    async fn block_receipts(&self, number: u64) -> Result<Vec<Option<FeeReceipt>>, OracleError>;

    /// Single receipt lookup, for diagnostics only.
    async fn transaction_receipt(&self, hash: H256) -> Result<FeeReceipt, OracleError>;
}

/// Block shape returned by `eth_getBlockByNumber(n, false)`, reduced to what we read.
#[derive(Debug, Serialize, Deserialize)]
struct RpcBlock {
    #[serde(default)]
    transactions: Vec<H256>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    effective_gas_price: Option<U256>,
    gas_used: Option<U256>,
}

impl RpcReceipt {
    fn into_fee_receipt(self) -> Option<FeeReceipt> {
        Some(FeeReceipt::new(self.effective_gas_price?, self.gas_used?))
    }
}

/// [`ChainClient`] over JSON-RPC with an optional fallback endpoint.
pub struct EthereumClient {
    chain_id: u64,
    primary: Arc<Provider<Http>>,
    fallback: Option<Arc<Provider<Http>>>,
}

impl EthereumClient {
    pub fn new(chain_id: u64, rpc_url: &str, fallback_url: Option<&str>) -> anyhow::Result<Self> {
        let primary = Arc::new(Provider::<Http>::try_from(rpc_url)?);

        let fallback = if let Some(url) = fallback_url {
            Some(Arc::new(Provider::<Http>::try_from(url)?))
        } else {
            None
        };

        Ok(Self {
            chain_id,
            primary,
            fallback,
        })
    }

    /// Builds the client and checks the endpoint once.
    pub async fn connect(
        chain_id: u64,
        rpc_url: &str,
        fallback_url: Option<&str>,
    ) -> anyhow::Result<Self> {
        let client = Self::new(chain_id, rpc_url, fallback_url)?;

        let block_number = client.latest_block_number().await?;
        tracing::info!(
            chain_id,
            "Chain RPC connected, current block: {}",
            block_number
        );

        Ok(client)
    }

    async fn call<T, F, Fut>(&self, method: &'static str, op: F) -> Result<T, ProviderError>
    where
        F: Fn(Arc<Provider<Http>>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        match op(self.primary.clone()).await {
            Ok(value) => Ok(value),
            Err(e) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!(
                        chain_id = self.chain_id,
                        method,
                        error = %e,
                        "Primary RPC failed, trying fallback"
                    );
                    op(fallback.clone()).await
                }
                None => Err(e),
            },
        }
    }
}

#[async_trait]
impl ChainClient for EthereumClient {
    async fn latest_block_number(&self) -> Result<u64, OracleError> {
        let number = self
            .call("eth_blockNumber", |provider| async move {
                provider.request::<_, U64>("eth_blockNumber", ()).await
            })
            .await?;
        Ok(number.as_u64())
    }

    async fn block_transactions(&self, number: u64) -> Result<Vec<H256>, OracleError> {
        let block = self
            .call("eth_getBlockByNumber", |provider| async move {
                provider
                    .request::<_, Option<RpcBlock>>(
                        "eth_getBlockByNumber",
                        (BlockNumber::Number(U64::from(number)), false),
                    )
                    .await
            })
            .await?;

        let chain_id = self.chain_id;
        block
            .map(|b| b.transactions)
            .ok_or_else(|| OracleError::NotFound(format!("block {number} on chain {chain_id}")))
    }

    async fn block_receipts(&self, number: u64) -> Result<Vec<Option<FeeReceipt>>, OracleError> {
        let receipts = self
            .call("eth_getBlockReceipts", |provider| async move {
                provider
                    .request::<_, Option<Vec<Option<RpcReceipt>>>>(
                        "eth_getBlockReceipts",
                        [BlockNumber::Number(U64::from(number))],
                    )
                    .await
            })
            .await?
            .ok_or_else(|| {
                OracleError::NotFound(format!(
                    "receipts of block {number} on chain {}",
                    self.chain_id
                ))
            })?;

        Ok(receipts
            .into_iter()
            .map(|receipt| receipt.and_then(RpcReceipt::into_fee_receipt))
            .collect())
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<FeeReceipt, OracleError> {
        let receipt = self
            .call("eth_getTransactionReceipt", |provider| async move {
                provider
                    .request::<_, Option<RpcReceipt>>("eth_getTransactionReceipt", [hash])
                    .await
            })
            .await?;

        receipt
            .and_then(RpcReceipt::into_fee_receipt)
            .ok_or_else(|| OracleError::NotFound(format!("receipt of transaction {hash:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn rpc_result(result: serde_json::Value) -> String {
        json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string()
    }

    #[tokio::test]
    async fn reads_latest_block_number() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_blockNumber" })))
            .with_header("content-type", "application/json")
            .with_body(rpc_result(json!("0x10")))
            .create_async()
            .await;

        let client = EthereumClient::connect(1, &server.url(), None).await.unwrap();
        assert_eq!(client.latest_block_number().await.unwrap(), 16);
    }

    #[tokio::test]
    async fn block_receipts_keep_null_entries() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_getBlockReceipts" })))
            .with_header("content-type", "application/json")
            .with_body(rpc_result(json!([
                { "effectiveGasPrice": "0x64", "gasUsed": "0x2" },
                null,
                { "gasUsed": "0x5208" }
            ])))
            .create_async()
            .await;

        let client = EthereumClient::new(1, &server.url(), None).unwrap();
        let receipts = client.block_receipts(5).await.unwrap();

        assert_eq!(receipts.len(), 3);
        assert_eq!(receipts[0], Some(FeeReceipt::new(100u64, 2u64)));
        assert_eq!(receipts[1], None);
        // no effectiveGasPrice, treated as absent
        assert_eq!(receipts[2], None);
    }

    #[tokio::test]
    async fn missing_block_is_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_getBlockByNumber" })))
            .with_header("content-type", "application/json")
            .with_body(rpc_result(serde_json::Value::Null))
            .create_async()
            .await;

        let client = EthereumClient::new(1, &server.url(), None).unwrap();
        let err = client.block_transactions(99).await.unwrap_err();
        assert!(matches!(err, OracleError::NotFound(_)));
    }

    #[tokio::test]
    async fn falls_back_when_primary_fails() {
        let mut primary = Server::new_async().await;
        primary
            .mock("POST", "/")
            .with_status(500)
            .create_async()
            .await;

        let mut fallback = Server::new_async().await;
        let tx = H256::repeat_byte(0xab);
        fallback
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_getBlockByNumber" })))
            .with_header("content-type", "application/json")
            .with_body(rpc_result(json!({ "number": "0x7", "transactions": [tx] })))
            .create_async()
            .await;

        let client = EthereumClient::new(1, &primary.url(), Some(&fallback.url())).unwrap();
        let txs = client.block_transactions(7).await.unwrap();
        assert_eq!(txs, vec![tx]);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(503)
            .create_async()
            .await;

        let client = EthereumClient::new(1, &server.url(), None).unwrap();
        let err = client.latest_block_number().await.unwrap_err();
        assert!(matches!(err, OracleError::Unavailable(_)));
    }
}
