pub mod args;
pub mod replay;
pub mod status;

pub use args::{Cli, CliCommand, ReplayCliArgs, StatusCliArgs};
pub use replay::handle_replay_command;
pub use status::handle_status_command;

use crate::config::Config;
use anyhow::Result;

pub fn handle_config_command() -> Result<()> {
    let config = Config::load()?;
    println!("# {}", Config::config_path()?.display());
    print!("{}", config.to_toml()?);
    Ok(())
}
