use alloy::{
    contract::Error as ContractError,
    primitives::TxHash,
    providers::PendingTransactionError,
    transports::TransportError,
};
use std::time::Duration;

/// Failure talking to a chain's RPC endpoint or contract
#[derive(Debug, thiserror::Error)]
pub enum ChainCommunicationError {
    /// Contract call failed or returned undecodable data
    #[error("ContractCall: {0}")]
    ContractCall(#[from] ContractError),
    /// RPC transport error
    #[error("Transport: {0}")]
    Transport(#[from] TransportError),
    /// Broadcast transaction was never confirmed
    #[error("PendingTransaction: {0}")]
    PendingTransaction(#[from] PendingTransactionError),
    /// Transaction was included but reverted
    #[error("Reverted: transaction {0} reverted")]
    Reverted(TxHash),
    /// No response within the configured RPC timeout
    #[error("Timeout: no response after {0:?}")]
    Timeout(Duration),
    /// No signer configured for a chain we were asked to write to
    #[error("MissingSigner: no signer configured for {0}")]
    MissingSigner(String),
    /// Any other provider failure
    #[error("{0}")]
    Other(String),
}

/// `Error` for gas oracle reconciliation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No local chains were requested
    #[error("NoChains: No local chains requested")]
    NoChains,
    /// Chain name is not in the chain directory
    #[error("UnknownChain: Chain {0} is not configured")]
    UnknownChain(String),
    /// Desired configuration for the selected environment is missing
    #[error("PreconditionError: No desired gas oracle configuration for environment {0}")]
    UnknownEnvironment(String),
    /// Desired configuration has no entry for a requested local chain
    #[error("PreconditionError: No desired gas oracle configuration for chain {0}")]
    Precondition(String),
    /// No oracle contract accessor for a requested local chain
    #[error("MissingOracle: No gas oracle accessor for chain {0}")]
    MissingOracle(String),
    /// Reading the on-chain value failed
    #[error("ReadFailure: Reading gas data for remote {remote} (domain {remote_domain}) on {chain} failed: {source}")]
    ReadFailure {
        chain: String,
        remote: String,
        remote_domain: u32,
        #[source]
        source: ChainCommunicationError,
    },
    /// Submitting the batched update failed
    #[error("SubmissionFailure: Submitting gas data update on {chain} failed: {source}")]
    SubmissionFailure {
        chain: String,
        #[source]
        source: ChainCommunicationError,
    },
}

impl Error {
    /// Raised before any network call was made
    pub fn is_precondition(&self) -> bool {
        !matches!(
            self,
            Self::ReadFailure { .. } | Self::SubmissionFailure { .. }
        )
    }
}
