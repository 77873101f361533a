//! Keeps `StorageGasOracle` contracts across EVM chains in line with a
//! desired per-remote gas configuration, sending at most one batched update
//! per chain.

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

pub mod bindings;
pub mod chain;
mod de;
pub mod errors;
pub mod gas;
pub mod oracle;
pub mod reconcile;
pub mod report;
pub mod rpc;
pub mod settings;
pub mod submitter;
pub mod trace;

pub use chain::{Chain, ChainDirectory, ProtocolFamily};
pub use errors::{ChainCommunicationError, Error};
pub use gas::{DesiredConfiguration, RemoteGasData, RemoteGasDataConfig, RemoteGasDataTable};
pub use oracle::{EvmGasOracle, GasOracle, TransactionIntent};
pub use reconcile::{FailurePolicy, Oracles, Reconciler};
pub use report::{ChainReport, ChainStatus, RemoteReport, Report};
pub use rpc::RpcLabels;
pub use settings::Settings;
pub use submitter::{EvmSubmitter, TxOutcome, TxSubmitter};

/// Result returning reconciliation `Error`
pub type Result<T> = std::result::Result<T, Error>;
