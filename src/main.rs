mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, CrdAction};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => commands::check::run().await?,
        Commands::Serve(config) => {
            azdo_runner_operator::config::init_tracing(config.log_json);
            commands::serve::run(config).await?;
        }
        Commands::Crd { action } => match action {
            CrdAction::Generate => commands::crd::generate()?,
            CrdAction::Install => commands::crd::install().await?,
        },
    }

    Ok(())
}
