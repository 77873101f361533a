use alloy::sol;

use crate::gas::{RemoteGasData, RemoteGasDataConfig};

sol!(
    #[allow(missing_docs)]
    #[sol(rpc, all_derives)]
    interface StorageGasOracle {
        struct RemoteGasDataConfig {
            uint32 remoteDomain;
            uint128 tokenExchangeRate;
            uint128 gasPrice;
        }

        function remoteGasData(uint32 remoteDomain)
            external
            view
            returns (uint128 tokenExchangeRate, uint128 gasPrice);

        function setRemoteGasDataConfigs(RemoteGasDataConfig[] calldata configs) external;
    }
);

impl From<StorageGasOracle::remoteGasDataReturn> for RemoteGasData {
    fn from(ret: StorageGasOracle::remoteGasDataReturn) -> Self {
        Self {
            token_exchange_rate: ret.tokenExchangeRate,
            gas_price: ret.gasPrice,
        }
    }
}

impl From<&RemoteGasDataConfig> for StorageGasOracle::RemoteGasDataConfig {
    fn from(config: &RemoteGasDataConfig) -> Self {
        Self {
            remoteDomain: config.remote_domain,
            tokenExchangeRate: config.data.token_exchange_rate,
            gasPrice: config.data.gas_price,
        }
    }
}

impl From<StorageGasOracle::RemoteGasDataConfig> for RemoteGasDataConfig {
    fn from(config: StorageGasOracle::RemoteGasDataConfig) -> Self {
        Self {
            remote_domain: config.remoteDomain,
            data: RemoteGasData {
                token_exchange_rate: config.tokenExchangeRate,
                gas_price: config.gasPrice,
            },
        }
    }
}
