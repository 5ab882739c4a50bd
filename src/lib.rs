// Library root
// -----------
// This crate exposes the library surface used by the `networksage-demo`
// binary (`main.rs`).
//
// Module responsibilities:
// - `cli`: command-line arguments and the three actions.
// - `config`: API key, endpoints and polling cadence from the environment.
// - `api`: HTTP interactions with the NetworkSage API behind the
//   `SampleApi` trait.
// - `capture`: classifies the file handed to `e2e`.
// - `output`: JSON and Markdown writers plus the elapsed-time timeline.
// - `ui`: the action flows, progress lines and spinners.
pub mod api;
pub mod capture;
pub mod cli;
pub mod config;
pub mod error;
pub mod logger;
pub mod output;
pub mod ui;

use anyhow::Result;
use api::{ApiClient, SampleApi};
use cli::Cli;
use config::Config;
use std::time::Duration;

/// Resolve configuration and run the selected action. The API key is
/// checked before any client is built.
pub fn run(cli: &Cli) -> Result<()> {
    let config = Config::from_env(Duration::from_secs(cli.poll_interval))?;
    let interval = config.poll_interval;
    let api = ApiClient::new(config)?;
    dispatch(&api, cli, interval)
}

pub fn dispatch(api: &dyn SampleApi, cli: &Cli, interval: Duration) -> Result<()> {
    match cli.action.sample_action() {
        None => {
            let file = cli
                .file
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("No file supplied. Quitting!"))?;
            ui::run_e2e(api, file, &cli.outputfile, interval)?;
        }
        Some(action) => {
            let sample_id = cli.sampleid.as_deref().ok_or_else(|| {
                anyhow::anyhow!("Requesting {} requires a valid sample ID. Aborting!", action)
            })?;
            ui::run_lookup(api, action, sample_id, &cli.outputfile, interval)?;
        }
    }
    Ok(())
}
