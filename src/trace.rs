use clap::ValueEnum;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Log line format on stderr
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogStyle {
    /// Full log output
    #[default]
    Full,
    /// Compact log output
    Compact,
    /// Json log output
    Json,
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info`
/// level.
pub fn init(style: LogStyle) -> eyre::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match style {
        LogStyle::Full => builder.try_init(),
        LogStyle::Compact => builder.compact().try_init(),
        LogStyle::Json => builder.json().try_init(),
    }
    .map_err(|e| eyre::eyre!("Unable to install tracing subscriber: {e}"))
}
