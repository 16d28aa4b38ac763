use anyhow::Result;
use clap::Parser;
use meetstate::{
    app,
    cli::{
        handle_config_command, handle_replay_command, handle_status_command, Cli, CliCommand,
    },
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries native messaging frames
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("meetstate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(CliCommand::Status(args)) => handle_status_command(args).await,
        Some(CliCommand::Replay(args)) => handle_replay_command(args),
        Some(CliCommand::Config) => handle_config_command(),
        Some(CliCommand::Serve) | None => app::run_service().await,
    }
}
