//! CLI command implementations for the Snowcat server.

pub mod check;
pub mod serve;

use anyhow::{Context, Result};
use clap::Args;
use snowcat_core::{LogFormat, LoggingConfig, RowShape, SnowcatConfig, Transport};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Flags shared by every subcommand. They override the config file.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Configuration file path. Missing files are not an error.
    #[arg(short, long, global = true, default_value = "snowcat.yaml")]
    pub config: PathBuf,

    /// Snowflake account identifier.
    #[arg(long, global = true, env = "SNOWFLAKE_ACCOUNT")]
    pub account: Option<String>,

    /// Role to assume.
    #[arg(long, global = true, env = "SNOWFLAKE_ROLE")]
    pub role: Option<String>,

    /// Virtual warehouse to run queries on.
    #[arg(long, global = true, env = "SNOWFLAKE_WAREHOUSE")]
    pub warehouse: Option<String>,

    /// Login name hint for the identity provider.
    #[arg(long, global = true, env = "SNOWFLAKE_USER")]
    pub user: Option<String>,

    /// Log filter, e.g. `debug` or `snowcat_mcp=trace`. `RUST_LOG` wins.
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

/// Arguments for `snowcat serve`.
#[derive(Debug, Args, Default)]
pub struct ServeArgs {
    /// Transport type (stdio or http). Overrides config file.
    #[arg(long)]
    pub transport: Option<Transport>,

    /// HTTP port (only for http transport). Overrides config file.
    #[arg(long)]
    pub port: Option<u16>,

    /// Row rendering for query results (array or map). Overrides config file.
    #[arg(long)]
    pub row_shape: Option<RowShape>,
}

impl ServeArgs {
    pub fn apply(self, config: &mut SnowcatConfig) {
        if let Some(transport) = self.transport {
            config.mcp.transport = transport;
        }
        if let Some(port) = self.port {
            config.mcp.port = port;
        }
        if let Some(row_shape) = self.row_shape {
            config.query.row_shape = row_shape;
        }
    }
}

/// Read the config file if present and overlay the global flags.
pub fn load_config(args: &GlobalArgs) -> Result<SnowcatConfig> {
    let mut config = if args.config.exists() {
        SnowcatConfig::from_file(&args.config)
            .with_context(|| format!("Failed to load config file: {:?}", args.config))?
    } else {
        SnowcatConfig::default()
    };

    let warehouse = &mut config.warehouse;
    for (flag, slot) in [
        (&args.account, &mut warehouse.account),
        (&args.role, &mut warehouse.role),
        (&args.warehouse, &mut warehouse.warehouse),
        (&args.user, &mut warehouse.user),
    ] {
        if let Some(value) = flag {
            *slot = Some(value.clone());
        }
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    Ok(config)
}

/// Install the global subscriber. Output goes to stderr.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log level: {}", config.level))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}
