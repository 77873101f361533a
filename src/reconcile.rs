//! Reconciles desired gas oracle values against on-chain state.
//!
//! Every requested chain is planned before the first network call: chain
//! metadata, desired table, remote domain ids and oracle accessor are all
//! resolved up front, so a configuration problem aborts the run with nothing
//! read and nothing written. Each planned chain then goes through four
//! stages, one chain at a time:
//!
//! - `read`: fetch the on-chain value of every desired remote, in table order
//! - `diff`: keep the remotes whose on-chain value is not exactly the desired
//!   one
//! - `build`: encode one `setRemoteGasDataConfigs` call for all of them
//! - `submit`: send it as a single transaction, unless this is a dry run

use std::collections::HashMap;

use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    chain::{Chain, ChainDirectory},
    errors::Error,
    gas::{DesiredConfiguration, RemoteGasData, RemoteGasDataConfig},
    oracle::GasOracle,
    report::{ChainReport, ChainStatus, RemoteReport, Report},
    submitter::{TxOutcome, TxSubmitter},
    Result,
};

/// Oracle accessors keyed by local chain name
pub type Oracles = HashMap<String, Box<dyn GasOracle>>;

/// What happens to the rest of the run when a chain fails to read or submit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort on the first failure
    #[default]
    FailFast,
    /// Record the failure in that chain's report and carry on
    Isolate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedRemote {
    pub name: String,
    pub domain: u32,
    pub desired: RemoteGasData,
}

pub(crate) struct ChainPlan<'a> {
    pub chain: Chain,
    pub oracle: &'a dyn GasOracle,
    pub remotes: Vec<PlannedRemote>,
}

pub(crate) enum Planned<'a> {
    Skip(Chain),
    Reconcile(ChainPlan<'a>),
}

/// On-chain value of one remote next to its desired value
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Reading {
    pub remote: PlannedRemote,
    pub existing: RemoteGasData,
}

impl Reading {
    fn needs_update(&self) -> bool {
        self.existing != self.remote.desired
    }
}

/// Read every planned remote, sequentially, from the local oracle.
pub(crate) async fn read(plan: &ChainPlan<'_>) -> Result<Vec<Reading>> {
    let mut readings = Vec::with_capacity(plan.remotes.len());
    for remote in &plan.remotes {
        let existing = plan
            .oracle
            .remote_gas_data(remote.domain)
            .await
            .map_err(|source| Error::ReadFailure {
                chain: plan.chain.name.clone(),
                remote: remote.name.clone(),
                remote_domain: remote.domain,
                source,
            })?;
        readings.push(Reading {
            remote: remote.clone(),
            existing,
        });
    }
    Ok(readings)
}

/// Desired values of every remote whose on-chain value differs.
pub(crate) fn diff(readings: &[Reading]) -> Vec<RemoteGasDataConfig> {
    readings
        .iter()
        .filter(|reading| reading.needs_update())
        .map(|reading| RemoteGasDataConfig {
            remote_domain: reading.remote.domain,
            data: reading.remote.desired,
        })
        .collect()
}

/// Drives plan, read, diff, build and submit over a set of local chains
pub struct Reconciler<'a> {
    directory: &'a ChainDirectory,
    oracles: &'a Oracles,
    submitter: &'a dyn TxSubmitter,
    policy: FailurePolicy,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        directory: &'a ChainDirectory,
        oracles: &'a Oracles,
        submitter: &'a dyn TxSubmitter,
    ) -> Self {
        Self {
            directory,
            oracles,
            submitter,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bring every `local_chains` oracle in line with `desired`. With
    /// `dry_run` the same updates are computed but nothing is sent.
    pub async fn reconcile(
        &self,
        local_chains: &[String],
        desired: &DesiredConfiguration,
        dry_run: bool,
    ) -> Result<Report> {
        let plans = self.plan(local_chains, desired)?;

        let mut report = Report::new(dry_run);
        for planned in plans {
            let plan = match planned {
                Planned::Skip(chain) => {
                    warn!(
                        chain = %chain.name,
                        protocol = %chain.protocol,
                        "skipping chain with unsupported protocol"
                    );
                    report.chains.push(ChainReport::skipped(&chain));
                    continue;
                }
                Planned::Reconcile(plan) => plan,
            };

            let span = info_span!("reconcile", chain = %plan.chain.name);
            match self.reconcile_chain(&plan, dry_run).instrument(span).await {
                Ok(chain_report) => report.chains.push(chain_report),
                Err(err) if self.policy == FailurePolicy::Isolate => {
                    error!(chain = %plan.chain.name, error = %err, "chain failed, continuing");
                    report.chains.push(ChainReport::failed(&plan.chain, &err));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(report)
    }

    pub(crate) fn plan(
        &self,
        local_chains: &[String],
        desired: &DesiredConfiguration,
    ) -> Result<Vec<Planned<'a>>> {
        if local_chains.is_empty() {
            return Err(Error::NoChains);
        }

        let oracles: &'a Oracles = self.oracles;
        local_chains
            .iter()
            .map(|name| -> Result<Planned<'a>> {
                let chain = self.directory.resolve(name)?;
                if !chain.protocol.is_supported() {
                    return Ok(Planned::Skip(chain.clone()));
                }

                let table = desired
                    .get(name)
                    .ok_or_else(|| Error::Precondition(name.clone()))?;
                let oracle = oracles
                    .get(name)
                    .ok_or_else(|| Error::MissingOracle(name.clone()))?;

                let remotes = table
                    .iter()
                    .map(|(remote, data)| -> Result<PlannedRemote> {
                        let remote_chain = self.directory.resolve(remote)?;
                        Ok(PlannedRemote {
                            name: remote.to_owned(),
                            domain: remote_chain.domain,
                            desired: *data,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(Planned::Reconcile(ChainPlan {
                    chain: chain.clone(),
                    oracle: oracle.as_ref(),
                    remotes,
                }))
            })
            .collect()
    }

    async fn reconcile_chain(&self, plan: &ChainPlan<'_>, dry_run: bool) -> Result<ChainReport> {
        let readings = read(plan).await?;
        for reading in &readings {
            info!(
                remote = %reading.remote.name,
                remote_domain = reading.remote.domain,
                existing = ?reading.existing,
                desired = ?reading.remote.desired,
                needs_update = reading.needs_update(),
                "compared remote gas data"
            );
        }

        let pending = diff(&readings);
        let transaction = if pending.is_empty() {
            info!("gas oracle matches desired configuration");
            None
        } else if dry_run {
            info!(updates = pending.len(), "dry run, not submitting");
            None
        } else {
            Some(self.submit(plan, &pending).await?)
        };

        let updated = transaction.is_some();
        let remotes = readings
            .into_iter()
            .map(|reading| {
                let needs_update = reading.needs_update();
                RemoteReport {
                    remote: reading.remote.name,
                    remote_domain: reading.remote.domain,
                    existing: reading.existing,
                    desired: reading.remote.desired,
                    needs_update,
                    updated: needs_update && updated,
                }
            })
            .collect();

        Ok(ChainReport {
            chain: plan.chain.name.clone(),
            domain: plan.chain.domain,
            status: ChainStatus::Reconciled {
                remotes,
                pending,
                transaction,
            },
        })
    }

    async fn submit(
        &self,
        plan: &ChainPlan<'_>,
        pending: &[RemoteGasDataConfig],
    ) -> Result<TxOutcome> {
        let intent = plan.oracle.set_remote_gas_data_configs(pending);
        info!(updates = pending.len(), to = %intent.to, "submitting batched gas oracle update");
        self.submitter
            .submit(&plan.chain.name, intent)
            .await
            .map_err(|source| Error::SubmissionFailure {
                chain: plan.chain.name.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use alloy::{
        primitives::{Address, TxHash},
        sol_types::SolCall,
    };
    use async_trait::async_trait;

    use super::*;
    use crate::{
        bindings::StorageGasOracle,
        chain::ProtocolFamily,
        errors::ChainCommunicationError,
        gas::RemoteGasDataTable,
        oracle::{set_remote_gas_data_configs_intent, MockGasOracle, TransactionIntent},
        submitter::MockTxSubmitter,
    };

    type OnChain = Arc<Mutex<HashMap<String, HashMap<u32, RemoteGasData>>>>;

    /// Oracle backed by shared in-memory state, counting reads
    struct FakeOracle {
        chain: String,
        address: Address,
        state: OnChain,
        reads: Arc<Mutex<Vec<(String, u32)>>>,
        fail_reads: bool,
    }

    #[async_trait]
    impl GasOracle for FakeOracle {
        async fn remote_gas_data(
            &self,
            remote_domain: u32,
        ) -> std::result::Result<RemoteGasData, ChainCommunicationError> {
            self.reads
                .lock()
                .unwrap()
                .push((self.chain.clone(), remote_domain));
            if self.fail_reads {
                return Err(ChainCommunicationError::Other("rpc down".to_owned()));
            }
            Ok(self
                .state
                .lock()
                .unwrap()
                .get(&self.chain)
                .and_then(|remotes| remotes.get(&remote_domain))
                .copied()
                .unwrap_or(RemoteGasData::new(0, 0)))
        }

        fn set_remote_gas_data_configs(
            &self,
            configs: &[RemoteGasDataConfig],
        ) -> TransactionIntent {
            set_remote_gas_data_configs_intent(self.address, configs)
        }
    }

    /// Submitter that decodes the batched call and applies it to the state
    struct FakeSubmitter {
        state: OnChain,
        submitted: Mutex<Vec<(String, Vec<RemoteGasDataConfig>)>>,
    }

    #[async_trait]
    impl TxSubmitter for FakeSubmitter {
        async fn submit(
            &self,
            chain: &str,
            intent: TransactionIntent,
        ) -> std::result::Result<TxOutcome, ChainCommunicationError> {
            let call =
                StorageGasOracle::setRemoteGasDataConfigsCall::abi_decode(&intent.calldata, true)
                    .map_err(|e| ChainCommunicationError::Other(e.to_string()))?;
            let configs: Vec<RemoteGasDataConfig> =
                call.configs.into_iter().map(Into::into).collect();

            let mut state = self.state.lock().unwrap();
            let remotes = state.entry(chain.to_owned()).or_default();
            for config in &configs {
                remotes.insert(config.remote_domain, config.data);
            }

            let mut submitted = self.submitted.lock().unwrap();
            submitted.push((chain.to_owned(), configs));
            Ok(TxOutcome {
                tx_hash: TxHash::with_last_byte(submitted.len() as u8),
                block_number: Some(submitted.len() as u64),
            })
        }
    }

    struct Harness {
        directory: ChainDirectory,
        state: OnChain,
        reads: Arc<Mutex<Vec<(String, u32)>>>,
        oracles: Oracles,
        submitter: FakeSubmitter,
    }

    impl Harness {
        /// `x`, `y`, `z` and `w` are EVM chains, `sol` is not
        fn new() -> Self {
            let directory = ChainDirectory::new([
                Chain::new("x", 1, ProtocolFamily::Ethereum),
                Chain::new("y", 2, ProtocolFamily::Ethereum),
                Chain::new("z", 3, ProtocolFamily::Ethereum),
                Chain::new("w", 4, ProtocolFamily::Ethereum),
                Chain::new("sol", 1399811149, ProtocolFamily::Sealevel),
            ]);
            let state = OnChain::default();
            let submitter = FakeSubmitter {
                state: state.clone(),
                submitted: Mutex::default(),
            };
            let mut harness = Self {
                directory,
                state,
                reads: Arc::default(),
                oracles: Oracles::new(),
                submitter,
            };
            for (i, chain) in ["x", "y", "z", "w"].into_iter().enumerate() {
                harness.add_oracle(chain, i as u8 + 1, false);
            }
            harness
        }

        fn add_oracle(&mut self, chain: &str, address: u8, fail_reads: bool) {
            self.oracles.insert(
                chain.to_owned(),
                Box::new(FakeOracle {
                    chain: chain.to_owned(),
                    address: Address::with_last_byte(address),
                    state: self.state.clone(),
                    reads: self.reads.clone(),
                    fail_reads,
                }),
            );
        }

        fn set_on_chain(&self, chain: &str, domain: u32, data: RemoteGasData) {
            self.state
                .lock()
                .unwrap()
                .entry(chain.to_owned())
                .or_default()
                .insert(domain, data);
        }

        fn on_chain(&self, chain: &str, domain: u32) -> Option<RemoteGasData> {
            self.state
                .lock()
                .unwrap()
                .get(chain)
                .and_then(|remotes| remotes.get(&domain))
                .copied()
        }

        fn reconciler(&self) -> Reconciler<'_> {
            Reconciler::new(&self.directory, &self.oracles, &self.submitter)
        }

        fn read_count(&self) -> usize {
            self.reads.lock().unwrap().len()
        }

        fn submitted(&self) -> Vec<(String, Vec<RemoteGasDataConfig>)> {
            self.submitter.submitted.lock().unwrap().clone()
        }
    }

    fn chains(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn config(remote_domain: u32, rate: u128, price: u128) -> RemoteGasDataConfig {
        RemoteGasDataConfig {
            remote_domain,
            data: RemoteGasData::new(rate, price),
        }
    }

    fn table(remotes: &[(&str, RemoteGasData)]) -> RemoteGasDataTable {
        remotes
            .iter()
            .map(|(name, data)| (name.to_string(), *data))
            .collect()
    }

    fn desired_config(local: Vec<(&str, RemoteGasDataTable)>) -> DesiredConfiguration {
        local
            .into_iter()
            .map(|(name, table)| (name.to_owned(), table))
            .collect()
    }

    /// x wants y = (10, 100) and z = (5, 50)
    fn scenario_desired() -> DesiredConfiguration {
        desired_config(vec![(
            "x",
            table(&[
                ("y", RemoteGasData::new(10, 100)),
                ("z", RemoteGasData::new(5, 50)),
            ]),
        )])
    }

    #[tokio::test]
    async fn single_differing_remote_is_submitted_alone() {
        let harness = Harness::new();
        harness.set_on_chain("x", 2, RemoteGasData::new(10, 100));
        harness.set_on_chain("x", 3, RemoteGasData::new(4, 50));

        let report = harness
            .reconciler()
            .reconcile(&chains(&["x"]), &scenario_desired(), false)
            .await
            .unwrap();

        let x = report.chain("x").unwrap();
        assert_eq!(x.pending(), &[config(3, 5, 50)]);
        assert_eq!(harness.submitted(), vec![("x".to_owned(), vec![config(3, 5, 50)])]);
        assert!(x.transaction().is_some());

        let remotes = x.remotes();
        assert_eq!(remotes[0].remote, "y");
        assert!(!remotes[0].needs_update);
        assert!(!remotes[0].updated);
        assert_eq!(remotes[1].remote, "z");
        assert!(remotes[1].updated);
        assert_eq!(harness.on_chain("x", 3), Some(RemoteGasData::new(5, 50)));
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let harness = Harness::new();
        harness.set_on_chain("x", 3, RemoteGasData::new(4, 50));
        let desired = scenario_desired();

        let first = harness
            .reconciler()
            .reconcile(&chains(&["x"]), &desired, false)
            .await
            .unwrap();
        assert_eq!(first.transaction_count(), 1);

        let second = harness
            .reconciler()
            .reconcile(&chains(&["x"]), &desired, false)
            .await
            .unwrap();
        assert_eq!(second.pending_count(), 0);
        assert_eq!(second.transaction_count(), 0);
        assert_eq!(harness.submitted().len(), 1);
    }

    #[tokio::test]
    async fn differing_remotes_share_one_transaction() {
        let harness = Harness::new();
        harness.set_on_chain("x", 2, RemoteGasData::new(1, 1));
        harness.set_on_chain("x", 3, RemoteGasData::new(7, 70));
        harness.set_on_chain("x", 4, RemoteGasData::new(9, 90));
        let desired = desired_config(vec![(
            "x",
            table(&[
                ("y", RemoteGasData::new(2, 2)),
                ("z", RemoteGasData::new(7, 70)),
                ("w", RemoteGasData::new(9, 91)),
            ]),
        )]);

        harness
            .reconciler()
            .reconcile(&chains(&["x"]), &desired, false)
            .await
            .unwrap();

        assert_eq!(
            harness.submitted(),
            vec![("x".to_owned(), vec![config(2, 2, 2), config(4, 9, 91)])]
        );
    }

    #[tokio::test]
    async fn matching_chain_sends_nothing() {
        let harness = Harness::new();
        harness.set_on_chain("x", 2, RemoteGasData::new(10, 100));
        harness.set_on_chain("x", 3, RemoteGasData::new(5, 50));

        let report = harness
            .reconciler()
            .reconcile(&chains(&["x"]), &scenario_desired(), false)
            .await
            .unwrap();

        assert!(harness.submitted().is_empty());
        assert!(report.chain("x").unwrap().pending().is_empty());
        assert_eq!(harness.read_count(), 2);
    }

    #[tokio::test]
    async fn dry_run_computes_the_same_updates_without_submitting() {
        let harness = Harness::new();
        harness.set_on_chain("x", 3, RemoteGasData::new(4, 50));
        let desired = scenario_desired();

        let mut submitter = MockTxSubmitter::new();
        submitter.expect_submit().never();
        let dry = Reconciler::new(&harness.directory, &harness.oracles, &submitter)
            .reconcile(&chains(&["x"]), &desired, true)
            .await
            .unwrap();

        let dry_x = dry.chain("x").unwrap();
        assert!(dry.dry_run);
        assert!(dry_x.transaction().is_none());
        assert!(dry_x.remotes().iter().all(|remote| !remote.updated));
        assert_eq!(harness.on_chain("x", 3), Some(RemoteGasData::new(4, 50)));

        let wet = harness
            .reconciler()
            .reconcile(&chains(&["x"]), &desired, false)
            .await
            .unwrap();
        assert_eq!(dry_x.pending(), wet.chain("x").unwrap().pending());
    }

    #[tokio::test]
    async fn unsupported_protocol_is_skipped() {
        let mut harness = Harness::new();
        let mut never_read = MockGasOracle::new();
        never_read.expect_remote_gas_data().never();
        never_read.expect_set_remote_gas_data_configs().never();
        harness.oracles.insert("sol".to_owned(), Box::new(never_read));
        harness.set_on_chain("x", 3, RemoteGasData::new(4, 50));

        let report = harness
            .reconciler()
            .reconcile(&chains(&["sol", "x"]), &scenario_desired(), false)
            .await
            .unwrap();

        assert_matches!(
            report.chain("sol").unwrap().status,
            ChainStatus::Skipped {
                protocol: ProtocolFamily::Sealevel
            }
        );
        assert_eq!(report.chains[1].chain, "x");
        assert_eq!(harness.submitted().len(), 1);
    }

    #[tokio::test]
    async fn missing_desired_chain_fails_before_any_read() {
        let harness = Harness::new();
        let desired = desired_config(vec![("x", table(&[("y", RemoteGasData::new(1, 1))]))]);

        let result = harness
            .reconciler()
            .reconcile(&chains(&["x", "y"]), &desired, false)
            .await;

        assert_matches!(result, Err(Error::Precondition(chain)) if chain == "y");
        assert_eq!(harness.read_count(), 0);
        assert!(harness.submitted().is_empty());
    }

    #[tokio::test]
    async fn unknown_remote_fails_before_any_read() {
        let harness = Harness::new();
        let desired = desired_config(vec![(
            "x",
            table(&[
                ("y", RemoteGasData::new(1, 1)),
                ("polygon", RemoteGasData::new(1, 1)),
            ]),
        )]);

        let result = harness
            .reconciler()
            .reconcile(&chains(&["x"]), &desired, false)
            .await;

        assert_matches!(result, Err(Error::UnknownChain(chain)) if chain == "polygon");
        assert_eq!(harness.read_count(), 0);
    }

    #[tokio::test]
    async fn empty_request_and_missing_oracle_are_rejected() {
        let mut harness = Harness::new();
        let desired = scenario_desired();

        let result = harness.reconciler().reconcile(&[], &desired, false).await;
        assert_matches!(result, Err(Error::NoChains));

        harness.oracles.remove("x");
        let result = harness
            .reconciler()
            .reconcile(&chains(&["x"]), &desired, false)
            .await;
        assert_matches!(result, Err(Error::MissingOracle(chain)) if chain == "x");
    }

    fn two_chain_desired() -> DesiredConfiguration {
        desired_config(vec![
            ("x", table(&[("y", RemoteGasData::new(3, 3))])),
            ("z", table(&[("y", RemoteGasData::new(6, 6))])),
        ])
    }

    #[tokio::test]
    async fn read_failure_aborts_remaining_chains() {
        let mut harness = Harness::new();
        harness.add_oracle("x", 1, true);

        let result = harness
            .reconciler()
            .reconcile(&chains(&["x", "z"]), &two_chain_desired(), false)
            .await;

        assert_matches!(
            result,
            Err(Error::ReadFailure { chain, remote_domain: 2, .. }) if chain == "x"
        );
        assert_eq!(*harness.reads.lock().unwrap(), vec![("x".to_owned(), 2)]);
        assert!(harness.submitted().is_empty());
    }

    #[tokio::test]
    async fn isolated_failure_lets_later_chains_finish() {
        let mut harness = Harness::new();
        harness.add_oracle("x", 1, true);

        let report = harness
            .reconciler()
            .with_policy(FailurePolicy::Isolate)
            .reconcile(&chains(&["x", "z"]), &two_chain_desired(), false)
            .await
            .unwrap();

        assert!(report.has_failures());
        assert_matches!(report.chain("x").unwrap().status, ChainStatus::Failed { .. });
        assert_eq!(harness.submitted(), vec![("z".to_owned(), vec![config(2, 6, 6)])]);
    }

    #[tokio::test]
    async fn submission_failure_aborts_after_earlier_chain_was_sent() {
        let harness = Harness::new();
        let mut submitter = MockTxSubmitter::new();
        let mut seq = mockall::Sequence::new();
        submitter
            .expect_submit()
            .withf(|chain, _| chain == "x")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(TxOutcome {
                    tx_hash: TxHash::with_last_byte(1),
                    block_number: None,
                })
            });
        submitter
            .expect_submit()
            .withf(|chain, _| chain == "z")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(ChainCommunicationError::Reverted(TxHash::with_last_byte(2))));

        let result = Reconciler::new(&harness.directory, &harness.oracles, &submitter)
            .reconcile(&chains(&["x", "z"]), &two_chain_desired(), false)
            .await;

        assert_matches!(
            result,
            Err(Error::SubmissionFailure {
                chain,
                source: ChainCommunicationError::Reverted(_)
            }) if chain == "z"
        );
    }

    #[test]
    fn diff_uses_exact_equality() {
        let remote = |domain, desired| PlannedRemote {
            name: format!("r{domain}"),
            domain,
            desired,
        };
        let readings = vec![
            Reading {
                remote: remote(1, RemoteGasData::new(10, 100)),
                existing: RemoteGasData::new(10, 100),
            },
            Reading {
                remote: remote(2, RemoteGasData::new(10, 100)),
                existing: RemoteGasData::new(10, 101),
            },
            Reading {
                remote: remote(3, RemoteGasData::new(10, 100)),
                existing: RemoteGasData::new(11, 100),
            },
        ];

        assert_eq!(
            diff(&readings),
            vec![config(2, 10, 100), config(3, 10, 100)]
        );
    }
}
