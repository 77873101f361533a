use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{errors::Error, Result};

/// Protocol family a chain's contracts are written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFamily {
    Ethereum,
    Sealevel,
    Cosmos,
    Fuel,
    Starknet,
}

impl ProtocolFamily {
    /// Only EVM chains carry a `StorageGasOracle` we can reconcile.
    pub fn is_supported(self) -> bool {
        matches!(self, Self::Ethereum)
    }
}

impl fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ethereum => "ethereum",
            Self::Sealevel => "sealevel",
            Self::Cosmos => "cosmos",
            Self::Fuel => "fuel",
            Self::Starknet => "starknet",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub name: String,
    /// Domain id used by the oracle contract, not the EVM chain id
    pub domain: u32,
    pub protocol: ProtocolFamily,
}

impl Chain {
    pub fn new(name: impl Into<String>, domain: u32, protocol: ProtocolFamily) -> Self {
        Self {
            name: name.into(),
            domain,
            protocol,
        }
    }
}

/// Every configured chain, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct ChainDirectory {
    chains: IndexMap<String, Chain>,
}

impl ChainDirectory {
    /// A later chain with an already seen name replaces the earlier one.
    pub fn new(chains: impl IntoIterator<Item = Chain>) -> Self {
        Self {
            chains: chains
                .into_iter()
                .map(|chain| (chain.name.clone(), chain))
                .collect(),
        }
    }

    pub fn resolve(&self, name: &str) -> Result<&Chain> {
        self.chains
            .get(name)
            .ok_or_else(|| Error::UnknownChain(name.to_owned()))
    }
}
