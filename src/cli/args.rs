use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "meetstate")]
#[command(about = "Browser meeting presence bridge", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the native messaging host (default)
    Serve,
    /// Show the meeting state reported by a running host
    Status(StatusCliArgs),
    /// Drive the meeting watcher from a scripted document
    Replay(ReplayCliArgs),
    /// Print the config file location and effective settings
    Config,
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct StatusCliArgs {
    /// Base URL of the host API (default: from config)
    #[arg(long)]
    pub url: Option<String>,
    /// Print waybar custom module output instead of the full state
    #[arg(long)]
    pub waybar: bool,
}

#[derive(ClapArgs, Debug)]
pub struct ReplayCliArgs {
    /// Replay script (JSON)
    pub script: PathBuf,
    /// Write JSON lines instead of native messaging frames
    #[arg(long)]
    pub json: bool,
    /// Override the marker selector from config
    #[arg(long)]
    pub selector: Option<String>,
}
