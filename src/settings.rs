use alloy::{
    primitives::Address, providers::ProviderBuilder, signers::local::PrivateKeySigner,
    transports::http::reqwest::Url,
};
use eyre::{eyre, Result as EyreResult, WrapErr};
use indexmap::IndexMap;
use serde::Deserialize;
use std::{collections::HashMap, env, fs, path::Path, time::Duration};
use tracing::debug;

use crate::{
    chain::{Chain, ChainDirectory, ProtocolFamily},
    errors::Error,
    gas::DesiredConfiguration,
    oracle::EvmGasOracle,
    reconcile::Oracles,
    rpc::RpcLabels,
    submitter::EvmSubmitter,
    Result,
};

/// Name of the fallback signer key variable
const SIGNER_KEY_VAR: &str = "SIGNER_KEY";

/// Connection and identity of one configured chain
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConf {
    pub domain: u32,
    pub protocol: ProtocolFamily,
    /// Required for EVM chains reconciled as local chains
    pub rpc_url: Option<String>,
    /// `StorageGasOracle` address, required with `rpc_url`
    pub gas_oracle: Option<Address>,
}

/// Contents of the configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Every known chain, in file order
    pub chains: IndexMap<String, ChainConf>,
    /// Desired gas oracle state per environment
    #[serde(default)]
    pub environments: HashMap<String, DesiredConfiguration>,
}

impl Settings {
    pub fn from_toml(contents: &str) -> EyreResult<Self> {
        toml::from_str(contents).wrap_err("Invalid configuration")
    }

    pub fn from_file(path: impl AsRef<Path>) -> EyreResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("Unable to read config from {}", path.display()))?;
        Self::from_toml(&contents)
            .wrap_err_with(|| format!("Unable to load config from {}", path.display()))
    }

    pub fn chain_directory(&self) -> ChainDirectory {
        ChainDirectory::new(
            self.chains
                .iter()
                .map(|(name, conf)| Chain::new(name.clone(), conf.domain, conf.protocol)),
        )
    }

    /// Desired configuration of `environment`, which must exist
    pub fn desired(&self, environment: &str) -> Result<&DesiredConfiguration> {
        self.environments
            .get(environment)
            .ok_or_else(|| Error::UnknownEnvironment(environment.to_owned()))
    }

    /// Endpoint and oracle address of an EVM chain. `None` for chains that
    /// are unknown or not EVM, which the reconciler reports on its own.
    fn evm_endpoint(&self, name: &str) -> EyreResult<Option<(String, Address)>> {
        let Some(conf) = self.chains.get(name) else {
            return Ok(None);
        };
        if !conf.protocol.is_supported() {
            return Ok(None);
        }
        let rpc_url = conf
            .rpc_url
            .clone()
            .ok_or_else(|| eyre!("No rpc_url configured for {name}"))?;
        let gas_oracle = conf
            .gas_oracle
            .ok_or_else(|| eyre!("No gas_oracle configured for {name}"))?;
        Ok(Some((rpc_url, gas_oracle)))
    }

    /// Read-only oracle accessors for every EVM chain in `chains`
    pub fn oracles(&self, chains: &[String], timeout: Option<Duration>) -> EyreResult<Oracles> {
        let mut oracles = Oracles::new();
        for name in chains {
            let Some((rpc_url, gas_oracle)) = self.evm_endpoint(name)? else {
                continue;
            };
            let url: Url = rpc_url
                .parse()
                .wrap_err_with(|| format!("Invalid rpc_url for {name}"))?;
            let labels = RpcLabels::new(name.clone(), &url);
            let provider = ProviderBuilder::new().on_http(url);
            debug!(chain = %name, %gas_oracle, "configured gas oracle");
            oracles.insert(
                name.clone(),
                Box::new(EvmGasOracle::new(gas_oracle, provider, labels, timeout)),
            );
        }
        Ok(oracles)
    }

    /// Signing submitter for every EVM chain in `chains`, keys taken from the
    /// process environment
    pub fn submitter(
        &self,
        chains: &[String],
        timeout: Option<Duration>,
    ) -> EyreResult<EvmSubmitter> {
        self.submitter_with(chains, timeout, |var| env::var(var).ok())
    }

    fn submitter_with<F>(
        &self,
        chains: &[String],
        timeout: Option<Duration>,
        lookup: F,
    ) -> EyreResult<EvmSubmitter>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut submitter = EvmSubmitter::new(timeout);
        for name in chains {
            let Some((rpc_url, _)) = self.evm_endpoint(name)? else {
                continue;
            };
            let url: Url = rpc_url
                .parse()
                .wrap_err_with(|| format!("Invalid rpc_url for {name}"))?;
            let key = signer_key(name, &lookup).ok_or_else(|| {
                eyre!(
                    "No signer key for {name}. Set {} or {SIGNER_KEY_VAR}",
                    signer_key_var(name)
                )
            })?;
            let signer: PrivateKeySigner = key
                .trim()
                .parse()
                .wrap_err_with(|| format!("Invalid signer key for {name}"))?;
            debug!(chain = %name, address = %signer.address(), "configured signer");
            submitter = submitter.with_chain(name.clone(), url, signer);
        }
        Ok(submitter)
    }
}

/// `<CHAIN>_SIGNER_KEY`, with the chain name upper-cased and dashes replaced
fn signer_key_var(chain: &str) -> String {
    format!("{}_{SIGNER_KEY_VAR}", chain.to_uppercase().replace('-', "_"))
}

fn signer_key<F>(chain: &str, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(&signer_key_var(chain)).or_else(|| lookup(SIGNER_KEY_VAR))
}
