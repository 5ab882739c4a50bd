use crate::api::SampleAction;
use crate::config::DEFAULT_POLL_SECS;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub const DEFAULT_OUTPUT_FILE: &str = "output.md";

#[derive(Parser, Debug)]
#[command(
    name = "networksage-demo",
    version,
    about = "Upload captures to NetworkSage and fetch their summary or categorization"
)]
pub struct Cli {
    #[arg(short, long, value_enum, help = "Which action to perform")]
    pub action: Action,

    #[arg(
        short,
        long,
        required_if_eq("action", "e2e"),
        help = "Location (relative or absolute) of the capture to upload"
    )]
    pub file: Option<PathBuf>,

    #[arg(
        long,
        required_if_eq_any([("action", "categorization"), ("action", "summary")]),
        help = "Sample ID of an existing sample"
    )]
    pub sampleid: Option<String>,

    #[arg(
        short,
        long,
        default_value = DEFAULT_OUTPUT_FILE,
        help = "File used to store the output"
    )]
    pub outputfile: PathBuf,

    #[arg(
        long,
        env = "NETWORKSAGE_POLL_INTERVAL",
        default_value_t = DEFAULT_POLL_SECS,
        help = "Seconds between status checks while waiting on the service"
    )]
    pub poll_interval: u64,

    #[arg(short, long, help = "Log HTTP traffic and polling to stderr")]
    pub verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Upload a capture, wait for processing and summarize it.
    #[value(name = "e2e")]
    E2e,
    Categorization,
    Summary,
}

impl Action {
    /// The service-side result an action looks up, if any.
    pub fn sample_action(&self) -> Option<SampleAction> {
        match self {
            Action::E2e => None,
            Action::Categorization => Some(SampleAction::Categorization),
            Action::Summary => Some(SampleAction::Summary),
        }
    }
}
