use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{GlobalArgs, ServeArgs};

#[derive(Parser, Debug)]
#[command(
    name = "snowcat",
    version,
    about = "Expose a Snowflake warehouse to AI agents over MCP"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and serve MCP requests (the default).
    Serve(ServeArgs),

    /// Log in, print the Snowflake version and exit.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = commands::load_config(&cli.global)?;
    commands::init_logging(&config.logging)?;

    match cli.cmd.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => {
            args.apply(&mut config);
            commands::serve::run(config).await
        }
        Command::Check => commands::check::run(config).await,
    }
}
