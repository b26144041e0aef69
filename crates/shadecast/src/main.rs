mod cli;
mod producer;
mod run;
mod settings;

use anyhow::Result;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing(cli.verbose);
    run::run(cli)
}
