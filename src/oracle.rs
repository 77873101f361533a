use std::{marker::PhantomData, time::Duration};

use alloy::{
    network::{Ethereum, TransactionBuilder},
    primitives::{Address, Bytes},
    providers::Provider,
    rpc::types::TransactionRequest,
    sol_types::SolCall,
    transports::Transport,
};
use async_trait::async_trait;

use crate::{
    bindings::StorageGasOracle,
    errors::ChainCommunicationError,
    gas::{RemoteGasData, RemoteGasDataConfig},
    rpc::{instrumented, RpcLabels, ETH_CALL},
};

/// An unsigned contract call, ready for a submitter to sign and send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    pub to: Address,
    pub calldata: Bytes,
}

impl From<TransactionIntent> for TransactionRequest {
    fn from(intent: TransactionIntent) -> Self {
        TransactionRequest::default()
            .with_to(intent.to)
            .with_input(intent.calldata)
    }
}

/// Encode one `setRemoteGasDataConfigs` call covering every config.
pub fn set_remote_gas_data_configs_intent(
    oracle: Address,
    configs: &[RemoteGasDataConfig],
) -> TransactionIntent {
    let call = StorageGasOracle::setRemoteGasDataConfigsCall {
        configs: configs.iter().map(Into::into).collect(),
    };
    TransactionIntent {
        to: oracle,
        calldata: call.abi_encode().into(),
    }
}

/// Read and build access to the gas oracle of one local chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GasOracle: Send + Sync {
    /// Current on-chain gas data for `remote_domain`
    async fn remote_gas_data(
        &self,
        remote_domain: u32,
    ) -> Result<RemoteGasData, ChainCommunicationError>;

    /// Build, without touching the network, one batched update call
    fn set_remote_gas_data_configs(&self, configs: &[RemoteGasDataConfig]) -> TransactionIntent;
}

/// `StorageGasOracle` deployed on an EVM chain
pub struct EvmGasOracle<P, T> {
    address: Address,
    provider: P,
    labels: RpcLabels,
    timeout: Option<Duration>,
    _phantom: PhantomData<T>,
}

impl<P, T> EvmGasOracle<P, T>
where
    P: Provider<T, Ethereum>,
    T: Transport + Clone,
{
    pub fn new(
        address: Address,
        provider: P,
        labels: RpcLabels,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            address,
            provider,
            labels,
            timeout,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<P, T> GasOracle for EvmGasOracle<P, T>
where
    P: Provider<T, Ethereum> + Send + Sync,
    T: Transport + Clone,
{
    async fn remote_gas_data(
        &self,
        remote_domain: u32,
    ) -> Result<RemoteGasData, ChainCommunicationError> {
        let oracle = StorageGasOracle::new(self.address, &self.provider);
        let call = oracle.remoteGasData(remote_domain);
        let ret = instrumented(&self.labels, ETH_CALL, self.timeout, call.call()).await?;
        Ok(ret.into())
    }

    fn set_remote_gas_data_configs(&self, configs: &[RemoteGasDataConfig]) -> TransactionIntent {
        set_remote_gas_data_configs_intent(self.address, configs)
    }
}
