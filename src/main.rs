// Entrypoint for the CLI application.
// - Keeps `main` small: parse arguments, set up logging and hand off to
//   `networksage_demo::run`.
// - Returns `anyhow::Result` so failures print their context chain and
//   exit non-zero.

use clap::Parser;
use networksage_demo::{cli::Cli, logger::init_logger, run};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);
    run(&cli)
}
