use std::{path::PathBuf, process::exit, time::Duration};

use clap::{ArgGroup, Parser, ValueEnum};
use eyre::WrapErr;
use tracing::{error, info};

use gas_oracle_sync::{
    trace::{self, LogStyle},
    EvmSubmitter, FailurePolicy, Reconciler, Report, Settings,
};

/// Report format on stdout
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

/// Bring on-chain gas oracle values in line with the desired configuration
#[derive(Parser, Debug)]
#[command(name = "gas-oracle-sync", version)]
#[command(group(
    ArgGroup::new("which_chains")
        .required(true)
        .multiple(false)
        .args(["all", "chain"])
))]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, env = "GAS_ORACLE_SYNC_CONFIG", value_name = "PATH")]
    config: PathBuf,

    /// Which environment's desired gas oracle configuration to apply
    #[arg(long)]
    environment: String,

    /// Reconcile every local chain of the environment's desired configuration
    #[arg(long)]
    all: bool,

    /// Reconcile this chain. Repeat for several
    #[arg(long, value_name = "CHAIN")]
    chain: Vec<String>,

    /// Compute updates without submitting transactions
    #[arg(long)]
    dry_run: bool,

    /// Keep going after a chain fails to read or submit
    #[arg(long)]
    keep_going: bool,

    /// Give up on an RPC call after this many seconds
    #[arg(long, value_name = "SECS")]
    rpc_timeout: Option<u64>,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogStyle::Full)]
    log_style: LogStyle,
}

/// Exit codes as found in <sysexits.h>
enum ExitCode {
    Failure = 1,
    BadConfig = 78,
}

fn bad_config(error: impl std::fmt::Display) -> ! {
    error!("{error:#}");
    exit(ExitCode::BadConfig as i32)
}

fn print_report(report: &Report, format: OutputFormat) -> eyre::Result<()> {
    match format {
        OutputFormat::Text => print!("{report}"),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(report).wrap_err("Unable to serialize report")?
        ),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Args::parse();
    trace::init(args.log_style)?;

    let settings = Settings::from_file(&args.config).unwrap_or_else(|e| bad_config(e));
    let desired = settings
        .desired(&args.environment)
        .unwrap_or_else(|e| bad_config(e));
    let local_chains: Vec<String> = if args.all {
        desired.keys().cloned().collect()
    } else {
        args.chain.clone()
    };
    let timeout = args.rpc_timeout.map(Duration::from_secs);

    let oracles = settings
        .oracles(&local_chains, timeout)
        .unwrap_or_else(|e| bad_config(e));
    let submitter = if args.dry_run {
        EvmSubmitter::new(timeout)
    } else {
        settings
            .submitter(&local_chains, timeout)
            .unwrap_or_else(|e| bad_config(e))
    };
    let directory = settings.chain_directory();

    let policy = if args.keep_going {
        FailurePolicy::Isolate
    } else {
        FailurePolicy::FailFast
    };

    info!(
        environment = %args.environment,
        chains = ?local_chains,
        dry_run = args.dry_run,
        "reconciling gas oracles"
    );
    let report = Reconciler::new(&directory, &oracles, &submitter)
        .with_policy(policy)
        .reconcile(&local_chains, desired, args.dry_run)
        .await;

    match report {
        Ok(report) => {
            print_report(&report, args.output)?;
            info!(
                pending = report.pending_count(),
                transactions = report.transaction_count(),
                "done"
            );
            if report.has_failures() {
                exit(ExitCode::Failure as i32)
            }
            Ok(())
        }
        Err(error) if error.is_precondition() => bad_config(error),
        Err(error) => Err(error.into()),
    }
}
