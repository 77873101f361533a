//! Per-chain outcome of a reconciliation run. Serialized to json for
//! `--output json`, rendered as plain lines otherwise.

use serde::Serialize;
use std::fmt;

use crate::{
    chain::{Chain, ProtocolFamily},
    gas::{format_exchange_rate, RemoteGasData, RemoteGasDataConfig},
    submitter::TxOutcome,
};

/// Existing vs desired gas data for one remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteReport {
    pub remote: String,
    pub remote_domain: u32,
    pub existing: RemoteGasData,
    pub desired: RemoteGasData,
    /// On-chain value differs from desired
    pub needs_update: bool,
    /// The difference was written in this run
    pub updated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChainStatus {
    /// Protocol family without a reconcilable oracle
    Skipped { protocol: ProtocolFamily },
    Reconciled {
        remotes: Vec<RemoteReport>,
        pending: Vec<RemoteGasDataConfig>,
        transaction: Option<TxOutcome>,
    },
    /// Only produced when failures are isolated per chain
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub chain: String,
    pub domain: u32,
    #[serde(flatten)]
    pub status: ChainStatus,
}

impl ChainReport {
    pub(crate) fn skipped(chain: &Chain) -> Self {
        Self {
            chain: chain.name.clone(),
            domain: chain.domain,
            status: ChainStatus::Skipped {
                protocol: chain.protocol,
            },
        }
    }

    pub(crate) fn failed(chain: &Chain, error: &impl fmt::Display) -> Self {
        Self {
            chain: chain.name.clone(),
            domain: chain.domain,
            status: ChainStatus::Failed {
                error: error.to_string(),
            },
        }
    }

    /// Updates computed for this chain, empty unless reconciled
    pub fn pending(&self) -> &[RemoteGasDataConfig] {
        match &self.status {
            ChainStatus::Reconciled { pending, .. } => pending,
            _ => &[],
        }
    }

    pub fn transaction(&self) -> Option<&TxOutcome> {
        match &self.status {
            ChainStatus::Reconciled { transaction, .. } => transaction.as_ref(),
            _ => None,
        }
    }

    pub fn remotes(&self) -> &[RemoteReport] {
        match &self.status {
            ChainStatus::Reconciled { remotes, .. } => remotes,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub dry_run: bool,
    pub chains: Vec<ChainReport>,
}

impl Report {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            chains: Vec::new(),
        }
    }

    pub fn chain(&self, name: &str) -> Option<&ChainReport> {
        self.chains.iter().find(|report| report.chain == name)
    }

    pub fn transaction_count(&self) -> usize {
        self.chains
            .iter()
            .filter(|report| report.transaction().is_some())
            .count()
    }

    pub fn pending_count(&self) -> usize {
        self.chains.iter().map(|report| report.pending().len()).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.chains
            .iter()
            .any(|report| matches!(report.status, ChainStatus::Failed { .. }))
    }
}

fn write_gas_data(f: &mut fmt::Formatter<'_>, data: &RemoteGasData) -> fmt::Result {
    write!(
        f,
        "rate {} gas price {}",
        format_exchange_rate(data.token_exchange_rate),
        data.gas_price
    )
}

impl fmt::Display for RemoteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): ", self.remote, self.remote_domain)?;
        if !self.needs_update {
            write!(f, "unchanged, ")?;
            return write_gas_data(f, &self.existing);
        }
        write_gas_data(f, &self.existing)?;
        write!(f, " -> ")?;
        write_gas_data(f, &self.desired)?;
        if self.updated {
            write!(f, " [UPDATED]")
        } else {
            write!(f, " [PENDING]")
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.chains {
            writeln!(f, "[CHAIN] {} (domain {})", report.chain, report.domain)?;
            match &report.status {
                ChainStatus::Skipped { protocol } => {
                    writeln!(f, "[SKIPPED] unsupported protocol {protocol}")?;
                }
                ChainStatus::Failed { error } => {
                    writeln!(f, "[FAILURE] {error}")?;
                }
                ChainStatus::Reconciled {
                    remotes,
                    pending,
                    transaction,
                } => {
                    for remote in remotes {
                        writeln!(f, "  {remote}")?;
                    }
                    match transaction {
                        Some(tx) => writeln!(
                            f,
                            "[SUCCESS] {} update(s) in transaction {}",
                            pending.len(),
                            tx.tx_hash
                        )?,
                        None if pending.is_empty() => writeln!(f, "[OK] nothing to update")?,
                        None => writeln!(
                            f,
                            "[DRY RUN] {} update(s) not submitted",
                            pending.len()
                        )?,
                    }
                }
            }
            writeln!(f)?;
        }
        if self.dry_run && self.pending_count() > 0 {
            writeln!(
                f,
                "[NOTICE] Nothing written. Run again without `--dry-run` to submit."
            )?;
        }
        Ok(())
    }
}
