use std::{collections::HashMap, time::Duration};

use alloy::{
    network::{EthereumWallet, ReceiptResponse},
    primitives::TxHash,
    providers::{Provider, ProviderBuilder},
    rpc::types::{TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::http::reqwest::Url,
};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    errors::ChainCommunicationError,
    oracle::TransactionIntent,
    rpc::{instrumented, RpcLabels, ETH_GET_TRANSACTION_RECEIPT, ETH_SEND_RAW_TRANSACTION},
};

/// Receipt of an included, successful transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TxOutcome {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

/// Signs, broadcasts and awaits inclusion of a transaction on a chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TxSubmitter: Send + Sync {
    async fn submit(
        &self,
        chain: &str,
        intent: TransactionIntent,
    ) -> Result<TxOutcome, ChainCommunicationError>;
}

#[derive(Debug, Clone)]
struct ChainSender {
    rpc_url: Url,
    wallet: EthereumWallet,
    labels: RpcLabels,
}

/// Submits through an HTTP wallet provider per chain
#[derive(Debug, Clone, Default)]
pub struct EvmSubmitter {
    chains: HashMap<String, ChainSender>,
    timeout: Option<Duration>,
}

impl EvmSubmitter {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            chains: HashMap::new(),
            timeout,
        }
    }

    /// Register the endpoint and signer used for `chain`
    pub fn with_chain(
        mut self,
        chain: impl Into<String>,
        rpc_url: Url,
        signer: PrivateKeySigner,
    ) -> Self {
        let chain = chain.into();
        let labels = RpcLabels::new(chain.clone(), &rpc_url);
        self.chains.insert(
            chain,
            ChainSender {
                rpc_url,
                wallet: EthereumWallet::from(signer),
                labels,
            },
        );
        self
    }
}

#[async_trait]
impl TxSubmitter for EvmSubmitter {
    async fn submit(
        &self,
        chain: &str,
        intent: TransactionIntent,
    ) -> Result<TxOutcome, ChainCommunicationError> {
        let sender = self
            .chains
            .get(chain)
            .ok_or_else(|| ChainCommunicationError::MissingSigner(chain.to_owned()))?;

        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(sender.wallet.clone())
            .on_http(sender.rpc_url.clone());

        let tx: TransactionRequest = intent.into();
        let pending = instrumented(
            &sender.labels,
            ETH_SEND_RAW_TRANSACTION,
            self.timeout,
            provider.send_transaction(tx),
        )
        .await?;
        debug!(chain, tx_hash = %pending.tx_hash(), "broadcast gas oracle update");

        let receipt = instrumented(
            &sender.labels,
            ETH_GET_TRANSACTION_RECEIPT,
            self.timeout,
            pending.get_receipt(),
        )
        .await?;
        let outcome = outcome(&receipt)?;
        info!(
            chain,
            tx_hash = %outcome.tx_hash,
            block = ?outcome.block_number,
            "gas oracle update included"
        );
        Ok(outcome)
    }
}

/// Successful outcome of an included transaction, `Reverted` otherwise
fn outcome(receipt: &TransactionReceipt) -> Result<TxOutcome, ChainCommunicationError> {
    if !receipt.status() {
        return Err(ChainCommunicationError::Reverted(receipt.transaction_hash));
    }
    Ok(TxOutcome {
        tx_hash: receipt.transaction_hash,
        block_number: receipt.block_number,
    })
}
