use anyhow::Result;
use clap::Parser;
use dsprites_vae::cli::{probe, train, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose() && std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    match &cli.command {
        Commands::Train(args) => {
            train::run(args)?;
        }
        Commands::Probe(args) => {
            probe::run(args)?;
        }
    }

    Ok(())
}
