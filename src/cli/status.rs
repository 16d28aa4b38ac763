//! Client for the host's status API.

use crate::cli::args::StatusCliArgs;
use crate::config::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;

pub async fn handle_status_command(args: StatusCliArgs) -> Result<()> {
    let base_url = match args.url {
        Some(url) => url,
        None => Config::load()?.api.base_url(),
    };
    let url = state_url(&base_url, args.waybar);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach meetstate at {}. Is it running?", base_url))?
        .error_for_status()
        .context("Status request was rejected")?;

    let body: Value = response
        .json()
        .await
        .context("Failed to parse status response")?;

    if args.waybar {
        // waybar expects one compact JSON object per line
        println!("{}", body);
    } else {
        println!("{}", serde_json::to_string_pretty(&body)?);
    }

    Ok(())
}

fn state_url(base_url: &str, waybar: bool) -> String {
    let mut url = format!("{}/state", base_url.trim_end_matches('/'));
    if waybar {
        url.push_str("?style=waybar");
    }
    url
}
