//! Per-request RPC instrumentation.
//!
//! Every contract read, broadcast and receipt wait is reported as a
//! `gas_oracle_sync::rpc` tracing event labelled with the provider node, the
//! chain, the JSON-RPC method and `success` or `failure`, along with the
//! time the request took.

use std::{
    future::IntoFuture,
    time::{Duration, Instant},
};

use alloy::transports::http::reqwest::Url;
use tracing::debug;

use crate::errors::ChainCommunicationError;

pub const ETH_CALL: &str = "eth_call";
pub const ETH_SEND_RAW_TRANSACTION: &str = "eth_sendRawTransaction";
pub const ETH_GET_TRANSACTION_RECEIPT: &str = "eth_getTransactionReceipt";

/// Labels attached to every request made for one chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcLabels {
    /// Chain name as configured
    pub chain: String,
    /// Host, and port if any, of the node, e.g. `localhost:8545`
    pub provider_node: String,
}

impl RpcLabels {
    pub fn new(chain: impl Into<String>, rpc_url: &Url) -> Self {
        Self {
            chain: chain.into(),
            provider_node: provider_node(rpc_url),
        }
    }
}

fn provider_node(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_owned(),
        (None, _) => "unknown".to_owned(),
    }
}

fn status<O>(result: &Result<O, ChainCommunicationError>) -> &'static str {
    if result.is_ok() {
        "success"
    } else {
        "failure"
    }
}

/// Await one request under `timeout` and record how it went
pub(crate) async fn instrumented<F, O, E>(
    labels: &RpcLabels,
    method: &'static str,
    timeout: Option<Duration>,
    fut: F,
) -> Result<O, ChainCommunicationError>
where
    F: IntoFuture<Output = Result<O, E>>,
    E: Into<ChainCommunicationError>,
{
    let start = Instant::now();
    let result = with_timeout(timeout, fut).await;
    let elapsed = start.elapsed();
    debug!(
        target: "gas_oracle_sync::rpc",
        provider_node = %labels.provider_node,
        chain = %labels.chain,
        method,
        status = status(&result),
        elapsed_ms = elapsed.as_millis() as u64,
        "rpc request"
    );
    result
}

/// Await `fut`, giving up after `timeout` if one is set
async fn with_timeout<F, O, E>(
    timeout: Option<Duration>,
    fut: F,
) -> Result<O, ChainCommunicationError>
where
    F: IntoFuture<Output = Result<O, E>>,
    E: Into<ChainCommunicationError>,
{
    match timeout {
        Some(duration) => tokio::time::timeout(duration, fut)
            .await
            .map_err(|_| ChainCommunicationError::Timeout(duration))?
            .map_err(Into::into),
        None => fut.await.map_err(Into::into),
    }
}
