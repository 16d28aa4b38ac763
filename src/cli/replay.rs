use crate::cli::args::ReplayCliArgs;
use crate::config::Config;
use crate::dom::Selector;
use crate::replay::{self, ReplayReport, Script};
use crate::watcher::{FrameSender, JsonLineSender};
use anyhow::{Context, Result};
use tracing::info;

/// Replay a script, writing the watcher's notifications to stdout.
///
/// Frames are written by default so the output can be piped straight into
/// `meetstate serve`.
pub fn handle_replay_command(args: ReplayCliArgs) -> Result<()> {
    let script = Script::load(&args.script)?;
    let selector = match args.selector {
        Some(raw) => Selector::parse(&raw).context("Invalid --selector")?,
        None => Config::load()?.watcher.selector()?,
    };

    info!(
        "Replaying {} steps from {:?} watching {}",
        script.steps.len(),
        args.script,
        selector
    );

    let stdout = std::io::stdout().lock();
    let report = if args.json {
        replay::run_script(&script, selector, JsonLineSender::new(stdout))?
    } else {
        replay::run_script(&script, selector, FrameSender::new(stdout))?
    };

    log_report(&report);
    Ok(())
}

fn log_report(report: &ReplayReport) {
    let state = match report.final_active {
        Some(true) => "active",
        Some(false) => "inactive",
        None => "never reported",
    };
    info!(
        "Replay finished: {} steps, {} mutation deliveries, meeting {}",
        report.steps, report.deliveries, state
    );
}
