//! Gas oracle values and the desired configuration table.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::de;

/// Fixed-point denominator of `token_exchange_rate`.
pub const TOKEN_EXCHANGE_RATE_SCALE: u128 = 10_000_000_000;

/// What a local oracle believes about the economics of one remote chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteGasData {
    /// Remote native token priced in local native token, scaled by
    /// [`TOKEN_EXCHANGE_RATE_SCALE`]
    #[serde(deserialize_with = "de::u128_scalar")]
    pub token_exchange_rate: u128,
    /// Remote gas price in the remote chain's smallest unit
    #[serde(deserialize_with = "de::u128_scalar")]
    pub gas_price: u128,
}

impl RemoteGasData {
    pub fn new(token_exchange_rate: u128, gas_price: u128) -> Self {
        Self {
            token_exchange_rate,
            gas_price,
        }
    }
}

/// One pending update: desired values for a remote domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemoteGasDataConfig {
    pub remote_domain: u32,
    #[serde(flatten)]
    pub data: RemoteGasData,
}

/// Desired remote values for one local chain, keyed by remote chain name in
/// document order.
pub type RemoteGasDataTable = IndexMap<String, RemoteGasData>;

/// Desired gas oracle state: local chain name to its remote table.
pub type DesiredConfiguration = IndexMap<String, RemoteGasDataTable>;

/// Render a scaled exchange rate as a decimal, e.g. `12500000000` as `1.25`.
pub fn format_exchange_rate(rate: u128) -> String {
    let whole = rate / TOKEN_EXCHANGE_RATE_SCALE;
    let fraction = rate % TOKEN_EXCHANGE_RATE_SCALE;
    if fraction == 0 {
        return whole.to_string();
    }
    let fraction = format!("{fraction:010}");
    format!("{whole}.{}", fraction.trim_end_matches('0'))
}
